use async_trait::async_trait;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};

/// Capability to take raw control of the connection a request arrived on.
///
/// The handle is consumed, so a single value can be hijacked at most once.
#[async_trait]
pub trait Hijack: Send + Sized + 'static {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Waits for the connection to be handed over.
    async fn hijack(self) -> Result<Self::Io, Self::Error>;
}

#[async_trait]
impl Hijack for OnUpgrade {
    type Io = TokioIo<Upgraded>;
    type Error = hyper::Error;

    async fn hijack(self) -> Result<Self::Io, Self::Error> {
        self.await.map(TokioIo::new)
    }
}
