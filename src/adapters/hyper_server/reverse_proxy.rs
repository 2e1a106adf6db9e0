use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONNECTION, HOST, UPGRADE};
use hyper::http::uri::{Authority, Scheme};
use hyper::upgrade::OnUpgrade;
use hyper::{Request, Response, StatusCode, Uri, Version};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tower_service::Service;
use tracing::{debug, error, info};
use url::Url;

use super::sniffer::PeerAddr;
use super::upgrade::{self, PendingUpgrade};
use crate::domain::{Result, TapError};

pub type Body = UnsyncBoxBody<Bytes, hyper::Error>;

const HOP_BY_HOP: &[&str] = &[
    "keep-alive",
    "proxy-connection",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
];

/// Forwards every request to a single upstream, relaying upgraded connections.
#[derive(Clone)]
pub struct ReverseProxy {
    authority: Authority,
    client: Client<HttpConnector, Incoming>,
}

impl ReverseProxy {
    pub fn new(upstream: &Url) -> Result<Self> {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self::with_client(upstream, client)
    }

    pub fn with_client(upstream: &Url, client: Client<HttpConnector, Incoming>) -> Result<Self> {
        match upstream.scheme() {
            "http" | "ws" => {}
            other => {
                return Err(TapError::InvalidUpstream(format!(
                    "unsupported scheme {} (expected http or ws)",
                    other
                )))
            }
        }

        let host = upstream
            .host_str()
            .ok_or_else(|| TapError::InvalidUpstream(format!("{} has no host", upstream)))?;
        let authority = match upstream.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let authority: Authority = authority
            .parse()
            .map_err(|e| TapError::InvalidUpstream(format!("{}: {}", upstream, e)))?;

        Ok(Self { authority, client })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub async fn handle(self, req: Request<Incoming>) -> Response<Body> {
        self.forward(req).await.unwrap_or_else(|e| {
            error!("Proxy error: {}", e);
            Response::builder()
                .status(StatusCode::BAD_GATEWAY)
                .body(empty())
                .unwrap()
        })
    }

    async fn forward(self, mut req: Request<Incoming>) -> Result<Response<Body>> {
        let client_upgrade = upgrade::take(&mut req);
        info!(
            "{} {} -> {}{}",
            req.method(),
            req.uri(),
            self.authority,
            if client_upgrade.is_some() { " (upgrade)" } else { "" }
        );

        let upstream_req = self.rewrite(req, client_upgrade.is_some())?;
        let mut res = self
            .client
            .request(upstream_req)
            .await
            .map_err(|e| TapError::Upstream(e.to_string()))?;

        if res.status() == StatusCode::SWITCHING_PROTOCOLS {
            let client_upgrade = client_upgrade.ok_or_else(|| {
                TapError::Upstream("upstream switched protocols on a request that cannot be upgraded".to_string())
            })?;
            let upstream_upgrade = hyper::upgrade::on(&mut res);
            tokio::spawn(tunnel(client_upgrade, upstream_upgrade));
        }

        Ok(res.map(|body| body.boxed_unsync()))
    }

    /// Points the request at the upstream and drops hop-by-hop headers.
    pub fn rewrite<B>(&self, req: Request<B>, upgrade: bool) -> Result<Request<B>> {
        let (mut parts, body) = req.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .to_string();
        parts.uri = Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| TapError::InvalidRequest(e.to_string()))?;
        parts.version = Version::HTTP_11;

        for name in HOP_BY_HOP {
            parts.headers.remove(*name);
        }
        if !upgrade {
            parts.headers.remove(CONNECTION);
            parts.headers.remove(UPGRADE);
        }

        let host = HeaderValue::from_str(self.authority.as_str())
            .map_err(|e| TapError::InvalidRequest(format!("Invalid host header: {}", e)))?;
        parts.headers.insert(HOST, host);

        if let Some(PeerAddr(peer)) = parts.extensions.get::<PeerAddr>().copied() {
            let ip = peer.ip().to_string();
            let forwarded = match parts.headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
                Some(prior) => format!("{}, {}", prior, ip),
                None => ip,
            };
            let forwarded = HeaderValue::from_str(&forwarded)
                .map_err(|e| TapError::InvalidRequest(format!("Invalid x-forwarded-for header: {}", e)))?;
            parts.headers.insert("x-forwarded-for", forwarded);
        }
        parts.extensions.clear();

        Ok(Request::from_parts(parts, body))
    }
}

impl Service<Request<Incoming>> for ReverseProxy {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Incoming>) -> Self::Future {
        let proxy = self.clone();
        Box::pin(async move { Ok(proxy.handle(req).await) })
    }
}

async fn tunnel(client: PendingUpgrade, upstream: OnUpgrade) {
    match upstream.await {
        Ok(server) => match client.hijack().await {
            Ok(mut conn) => {
                let tapped = conn.is_tapped();
                let mut server = TokioIo::new(server);
                match tokio::io::copy_bidirectional(&mut conn, &mut server).await {
                    Ok((from_client, from_upstream)) => debug!(
                        tapped,
                        "Tunnel closed: {} bytes from client, {} bytes from upstream", from_client, from_upstream
                    ),
                    Err(e) => debug!(tapped, "Tunnel error: {}", e),
                }
            }
            Err(e) => error!("Client refused to upgrade: {}", e),
        },
        Err(e) => error!("Upstream refused to upgrade: {}", e),
    }
}

fn empty() -> Body {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(upstream: &str) -> ReverseProxy {
        ReverseProxy::new(&upstream.parse().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_unsupported_scheme() {
        let err = ReverseProxy::new(&"https://example.com".parse().unwrap()).err().unwrap();
        assert!(matches!(err, TapError::InvalidUpstream(_)));
    }

    #[tokio::test]
    async fn test_ws_upstream_keeps_port() {
        let proxy = proxy("ws://127.0.0.1:9001/ignored");
        assert_eq!(proxy.authority().as_str(), "127.0.0.1:9001");
    }

    #[tokio::test]
    async fn test_rewrite_targets_upstream() {
        let proxy = proxy("http://echo.example.org");
        let req = Request::get("/chat?room=1")
            .header("host", "localhost:8080")
            .header("keep-alive", "timeout=5")
            .header("connection", "keep-alive")
            .body(())
            .unwrap();

        let req = proxy.rewrite(req, false).unwrap();

        assert_eq!(req.uri(), "http://echo.example.org/chat?room=1");
        assert_eq!(req.headers()["host"], "echo.example.org");
        assert!(req.headers().get("keep-alive").is_none());
        assert!(req.headers().get("connection").is_none());
        assert_eq!(req.version(), Version::HTTP_11);
    }

    #[tokio::test]
    async fn test_rewrite_keeps_upgrade_headers() {
        let proxy = proxy("http://127.0.0.1:9001");
        let req = Request::get("/ws")
            .header("connection", "Upgrade")
            .header("upgrade", "websocket")
            .body(())
            .unwrap();

        let req = proxy.rewrite(req, true).unwrap();

        assert_eq!(req.headers()["connection"], "Upgrade");
        assert_eq!(req.headers()["upgrade"], "websocket");
        assert_eq!(req.headers()["host"], "127.0.0.1:9001");
    }

    #[tokio::test]
    async fn test_rewrite_appends_forwarded_for() {
        let proxy = proxy("http://127.0.0.1:9001");
        let mut req = Request::get("/")
            .header("x-forwarded-for", "192.0.2.1")
            .body(())
            .unwrap();
        req.extensions_mut()
            .insert(PeerAddr("10.1.2.3:4567".parse().unwrap()));

        let req = proxy.rewrite(req, false).unwrap();

        assert_eq!(req.headers()["x-forwarded-for"], "192.0.2.1, 10.1.2.3");
        assert!(req.extensions().get::<PeerAddr>().is_none());
    }
}
