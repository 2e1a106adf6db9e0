#![cfg(test)]
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::read_head;

/// Upstream answering plain requests with `hello` and upgrade requests with
/// `101`, after which it waits for `HI`, replies `OK` and drains the socket.
pub struct UpstreamStub {
    addr: SocketAddr,
    heads: Arc<Mutex<Vec<String>>>,
    _handle: JoinHandle<()>,
}

impl UpstreamStub {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let heads = Arc::new(Mutex::new(Vec::new()));

        let recorded = heads.clone();
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(Self::handle_connection(socket, recorded.clone()));
            }
        });

        Ok(Self {
            addr,
            heads,
            _handle: handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> url::Url {
        format!("http://{}", self.addr).parse().unwrap()
    }

    /// Request heads received so far, lowercased.
    pub fn heads(&self) -> Vec<String> {
        self.heads.lock().unwrap().clone()
    }

    async fn handle_connection(mut socket: TcpStream, heads: Arc<Mutex<Vec<String>>>) {
        let head = match read_head(&mut socket).await {
            Ok(head) => head.to_lowercase(),
            Err(_) => return,
        };
        heads.lock().unwrap().push(head.clone());

        if head.contains("upgrade: tap-test") {
            let response = b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: tap-test\r\n\r\n";
            if socket.write_all(response).await.is_err() {
                return;
            }

            let mut hi = [0u8; 2];
            if socket.read_exact(&mut hi).await.is_err() || &hi != b"HI" {
                return;
            }
            if socket.write_all(b"OK").await.is_err() {
                return;
            }

            let mut rest = Vec::new();
            let _ = socket.read_to_end(&mut rest).await;
        } else {
            let response = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello";
            let _ = socket.write_all(response).await;
        }
    }
}
