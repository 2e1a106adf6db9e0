//! Bounded in-memory byte pipe carrying tapped bytes to an observer.
//!
//! Writes suspend while `capacity` bytes are buffered and unread, so a slow
//! observer backpressures whoever feeds the pipe. Dropping the writer ends the
//! stream for the reader; dropping the reader makes writes fail with
//! `BrokenPipe`.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

/// Creates a pipe buffering at most `capacity` bytes (at least one).
pub fn pipe(capacity: usize) -> (PipeReader, PipeWriter) {
    let (reader, writer) = tokio::io::duplex(capacity.max(1));
    (PipeReader { inner: reader }, PipeWriter { inner: writer })
}

/// Read end handed to observers.
#[derive(Debug)]
pub struct PipeReader {
    inner: DuplexStream,
}

/// Write end owned by the tapped connection.
#[derive(Debug)]
pub struct PipeWriter {
    inner: DuplexStream,
}

impl AsyncRead for PipeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
