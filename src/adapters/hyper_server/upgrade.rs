use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::domain::{TapHijacker, TeeConn};
use crate::ports::Hijack;

/// Upgrade handle taken off a request, tapped when the sniffer saw the request.
pub enum PendingUpgrade {
    Tapped(TapHijacker<OnUpgrade>),
    Raw(OnUpgrade),
}

impl PendingUpgrade {
    pub fn is_tapped(&self) -> bool {
        matches!(self, PendingUpgrade::Tapped(_))
    }

    /// Resolves once the response has been sent and hyper hands over the socket.
    pub async fn hijack(self) -> Result<HijackedConn, UpgradeError> {
        match self {
            PendingUpgrade::Tapped(hijacker) => hijacker
                .hijack()
                .await
                .map(|inner| HijackedConn::Tapped { inner })
                .map_err(UpgradeError::Hyper),
            PendingUpgrade::Raw(on_upgrade) => on_upgrade
                .hijack()
                .await
                .map(|inner| HijackedConn::Raw { inner })
                .map_err(UpgradeError::Hyper),
        }
    }
}

/// Removes the upgrade handle from `req`, if the connection can be upgraded.
pub fn take<B>(req: &mut Request<B>) -> Option<PendingUpgrade> {
    let extensions = req.extensions_mut();
    if let Some(hijacker) = extensions.remove::<TapHijacker<OnUpgrade>>() {
        return Some(PendingUpgrade::Tapped(hijacker));
    }
    extensions.remove::<OnUpgrade>().map(PendingUpgrade::Raw)
}

/// Counterpart of `hyper::upgrade::on` that honours an installed tap.
pub fn on<B>(req: &mut Request<B>) -> impl std::future::Future<Output = Result<HijackedConn, UpgradeError>> {
    let pending = take(req);
    async move {
        match pending {
            Some(pending) => pending.hijack().await,
            None => Err(UpgradeError::NotUpgradable),
        }
    }
}

#[derive(Debug)]
pub enum UpgradeError {
    NotUpgradable,
    Hyper(hyper::Error),
}

impl fmt::Display for UpgradeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeError::NotUpgradable => write!(f, "Request cannot be upgraded"),
            UpgradeError::Hyper(e) => write!(f, "Upgrade failed: {}", e),
        }
    }
}

impl std::error::Error for UpgradeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UpgradeError::NotUpgradable => None,
            UpgradeError::Hyper(e) => Some(e),
        }
    }
}

pub enum HijackedConn {
    Tapped { inner: TeeConn<TokioIo<Upgraded>> },
    Raw { inner: TokioIo<Upgraded> },
}

impl HijackedConn {
    pub fn is_tapped(&self) -> bool {
        matches!(self, HijackedConn::Tapped { .. })
    }
}

impl AsyncRead for HijackedConn {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HijackedConn::Tapped { inner } => Pin::new(inner).poll_read(cx, buf),
            HijackedConn::Raw { inner } => Pin::new(inner).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for HijackedConn {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match &mut *self {
            HijackedConn::Tapped { inner } => Pin::new(inner).poll_write(cx, buf),
            HijackedConn::Raw { inner } => Pin::new(inner).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HijackedConn::Tapped { inner } => Pin::new(inner).poll_flush(cx),
            HijackedConn::Raw { inner } => Pin::new(inner).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HijackedConn::Tapped { inner } => Pin::new(inner).poll_shutdown(cx),
            HijackedConn::Raw { inner } => Pin::new(inner).poll_shutdown(cx),
        }
    }
}
