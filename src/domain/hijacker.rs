use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::models::RequestMeta;
use super::pipe::pipe;
use super::tee::TeeConn;
use crate::ports::{Hijack, HijackObserver};

/// Hijack handle that taps the connection it hands over.
///
/// The real hijack runs first and its error is returned untouched. On success
/// the observer receives the read ends of two fresh pipes, and only then is the
/// connection returned, wrapped so that both directions feed those pipes.
#[derive(Clone)]
pub struct TapHijacker<H> {
    inner: H,
    request: RequestMeta,
    observer: Arc<dyn HijackObserver>,
    pipe_capacity: usize,
}

impl<H> TapHijacker<H> {
    pub fn new(inner: H, request: RequestMeta, observer: Arc<dyn HijackObserver>, pipe_capacity: usize) -> Self {
        Self {
            inner,
            request,
            observer,
            pipe_capacity,
        }
    }

    pub fn request(&self) -> &RequestMeta {
        &self.request
    }
}

#[async_trait]
impl<H: Hijack> Hijack for TapHijacker<H> {
    type Io = TeeConn<H::Io>;
    type Error = H::Error;

    async fn hijack(self) -> Result<Self::Io, Self::Error> {
        let io = self.inner.hijack().await?;

        let (inbound_reader, inbound_writer) = pipe(self.pipe_capacity);
        let (outbound_reader, outbound_writer) = pipe(self.pipe_capacity);

        debug!(
            id = %self.request.id,
            remote = %self.request.remote(),
            "{} {} hijacked, tap installed",
            self.request.method,
            self.request.uri
        );
        self.observer
            .on_hijacked(&self.request, inbound_reader, outbound_reader);

        Ok(TeeConn::new(io, inbound_writer, outbound_writer))
    }
}
