use std::convert::Infallible;
use std::net::SocketAddr;

use futures::future::poll_fn;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ServerBuilder;
use tokio::net::TcpListener;
use tower_service::Service;
use tracing::{debug, error};

use super::reverse_proxy::Body;
use super::sniffer::PeerAddr;

/// Accepts connections forever, serving each one on its own task with
/// upgrades enabled. Requests carry the peer address as a [`PeerAddr`]
/// extension.
pub async fn serve<S>(listener: TcpListener, service: S)
where
    S: Service<Request<Incoming>, Response = Response<Body>, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let io = TokioIo::new(stream);
                let service = service.clone();
                tokio::spawn(serve_connection(io, peer, service));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn serve_connection<S>(io: TokioIo<tokio::net::TcpStream>, peer: SocketAddr, service: S)
where
    S: Service<Request<Incoming>, Response = Response<Body>, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    debug!("New connection from {}", peer);

    let service_fn = service_fn(move |mut req: Request<Incoming>| {
        req.extensions_mut().insert(PeerAddr(peer));
        let mut service = service.clone();
        async move {
            poll_fn(|cx| service.poll_ready(cx)).await?;
            service.call(req).await
        }
    });

    if let Err(err) = ServerBuilder::new(TokioExecutor::new())
        .http1()
        .preserve_header_case(true)
        .title_case_headers(true)
        .serve_connection_with_upgrades(io, service_fn)
        .await
    {
        debug!("Connection error from {}: {}", peer, err);
    }
}
