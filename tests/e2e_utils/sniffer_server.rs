#![cfg(test)]
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use upgrade_sniffer::adapters::{serve, ReverseProxy, Sniffer};
use upgrade_sniffer::domain::{PipeReader, RequestMeta};

/// Everything the observer collected for one hijacked connection.
#[derive(Debug)]
pub struct CapturedTap {
    pub request: RequestMeta,
    pub inbound: Vec<u8>,
    pub outbound: Vec<u8>,
}

pub struct TestSnifferServer {
    addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    captured: mpsc::UnboundedReceiver<CapturedTap>,
    _server_handle: JoinHandle<()>,
}

impl TestSnifferServer {
    /// Reverse proxy to `upstream` wrapped in a sniffer whose observer collects
    /// both tapped directions until they end.
    pub async fn start(upstream: &url::Url) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, captured) = mpsc::unbounded_channel();

        let counter = calls.clone();
        let observer = move |request: &RequestMeta, inbound: PipeReader, outbound: PipeReader| {
            counter.fetch_add(1, Ordering::SeqCst);
            let tx = tx.clone();
            let request = request.clone();
            tokio::spawn(async move {
                let (inbound, outbound) = tokio::join!(read_all(inbound), read_all(outbound));
                let _ = tx.send(CapturedTap {
                    request,
                    inbound,
                    outbound,
                });
            });
        };

        let proxy = ReverseProxy::new(upstream)?;
        let sniffer = Sniffer::new(proxy, Arc::new(observer)).with_pipe_capacity(1024);
        let server_handle = tokio::spawn(serve(listener, sniffer));

        Ok(Self {
            addr,
            calls,
            captured,
            _server_handle: server_handle,
        })
    }

    /// Same reverse proxy without a sniffer in front of it.
    pub async fn start_untapped(
        upstream: &url::Url,
    ) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let proxy = ReverseProxy::new(upstream)?;
        Ok((addr, tokio::spawn(serve(listener, proxy))))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn observer_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Waits for the next connection whose tapped streams both ended.
    pub async fn next_capture(&mut self) -> Option<CapturedTap> {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.captured.recv())
            .await
            .ok()
            .flatten()
    }
}

async fn read_all(mut reader: PipeReader) -> Vec<u8> {
    let mut data = Vec::new();
    let _ = reader.read_to_end(&mut data).await;
    data
}
