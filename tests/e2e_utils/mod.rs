#![cfg(test)]
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod sniffer_server;
pub mod upstream_stub;

pub use sniffer_server::{CapturedTap, TestSnifferServer};
pub use upstream_stub::UpstreamStub;

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Reads from `stream` until the end of an HTTP head.
pub async fn read_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut byte))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "head not received"))??;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        head.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&head).to_string())
}

/// Opens an upgraded connection through the proxy and returns the raw socket
/// with the response head.
pub async fn upgrade(addr: std::net::SocketAddr, path: &str) -> std::io::Result<(TcpStream, String)> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: Upgrade\r\nUpgrade: tap-test\r\n\r\n",
        path
    );
    stream.write_all(request.as_bytes()).await?;
    let head = read_head(&mut stream).await?;
    Ok((stream, head))
}
