use std::collections::HashMap;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};

use hyper::upgrade::OnUpgrade;
use hyper::Request;
use tower_service::Service;

use crate::domain::{RequestMeta, TapHijacker};
use crate::ports::{Hijack, HijackObserver};

/// Peer address of the connection a request arrived on, set by the server loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Middleware installing a tap on every request that can be hijacked.
///
/// Requests without an upgrade handle `H` in their extensions reach the inner
/// service untouched. For the others, the handle is swapped for a
/// [`TapHijacker`] reporting to the shared observer.
///
/// Hyper's own `OnUpgrade` is no longer on a tapped request, so
/// `hyper::upgrade::on` fails inside a wrapped handler. Handlers must upgrade
/// through [`super::upgrade::on`] or [`super::upgrade::take`], which pick up
/// the tap and fall back to hyper's handle when no sniffer is installed.
pub struct Sniffer<S, H = OnUpgrade> {
    inner: S,
    observer: Arc<dyn HijackObserver>,
    pipe_capacity: usize,
    _handle: PhantomData<fn() -> H>,
}

impl<S> Sniffer<S> {
    /// Taps requests carrying hyper's upgrade handle.
    pub fn new(inner: S, observer: Arc<dyn HijackObserver>) -> Self {
        Self::wrap(inner, observer)
    }
}

impl<S, H> Sniffer<S, H> {
    /// Taps requests carrying an upgrade handle of type `H`.
    pub fn wrap(inner: S, observer: Arc<dyn HijackObserver>) -> Self {
        Self {
            inner,
            observer,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            _handle: PhantomData,
        }
    }

    pub fn with_pipe_capacity(mut self, pipe_capacity: usize) -> Self {
        self.pipe_capacity = pipe_capacity;
        self
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: Clone, H> Clone for Sniffer<S, H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            observer: self.observer.clone(),
            pipe_capacity: self.pipe_capacity,
            _handle: PhantomData,
        }
    }
}

impl<S, H, B> Service<Request<B>> for Sniffer<S, H>
where
    S: Service<Request<B>>,
    H: Hijack + Clone + Sync,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        install_tap::<H, B>(&mut req, &self.observer, self.pipe_capacity);
        self.inner.call(req)
    }
}

/// Swaps the request's upgrade handle for a tapping one. Returns whether a tap
/// was installed.
pub fn install_tap<H, B>(req: &mut Request<B>, observer: &Arc<dyn HijackObserver>, pipe_capacity: usize) -> bool
where
    H: Hijack + Clone + Sync,
{
    let Some(handle) = req.extensions_mut().remove::<H>() else {
        return false;
    };

    let meta = request_meta(req);
    let hijacker = TapHijacker::new(handle, meta, observer.clone(), pipe_capacity);
    req.extensions_mut().insert(hijacker);
    true
}

fn request_meta<B>(req: &Request<B>) -> RequestMeta {
    let mut headers: HashMap<String, String> = HashMap::new();
    for (name, value) in req.headers() {
        let Ok(value) = value.to_str() else {
            continue;
        };
        headers
            .entry(name.to_string())
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    let remote_addr = req.extensions().get::<PeerAddr>().map(|peer| peer.0);

    RequestMeta::new(req.method().as_str(), req.uri().to_string())
        .with_version(format!("{:?}", req.version()))
        .with_headers(headers)
        .with_remote_addr(remote_addr)
}
