//! Connection wrapper mirroring every byte read or written into a pair of sinks.
//!
//! Bytes read from the inner connection reach the inbound sink before they are
//! returned to the caller. Bytes accepted by the inner connection on write are
//! queued to the outbound sink and drained before the next write, flush or
//! shutdown. A full sink therefore suspends the connection itself; a failing
//! sink is detached and logged, never reported as a connection error.
//! Bytes still queued when the connection is dropped are written out by a
//! background task before the sink closes.

use std::io::{self, IoSlice};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::{debug, warn};

use super::models::Direction;
use super::pipe::PipeWriter;

struct Sink {
    direction: Direction,
    writer: Option<PipeWriter>,
    pending: Vec<u8>,
}

impl Sink {
    fn new(direction: Direction, writer: PipeWriter) -> Self {
        Self {
            direction,
            writer: Some(writer),
            pending: Vec::new(),
        }
    }

    fn is_attached(&self) -> bool {
        self.writer.is_some()
    }

    fn push(&mut self, bytes: &[u8]) {
        if self.is_attached() {
            self.pending.extend_from_slice(bytes);
        }
    }

    /// Writes queued bytes into the sink. Ready once nothing is left to write.
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        while !self.pending.is_empty() {
            let Some(writer) = self.writer.as_mut() else {
                self.pending.clear();
                break;
            };
            match Pin::new(writer).poll_write(cx, &self.pending) {
                Poll::Ready(Ok(0)) => self.detach(&io::ErrorKind::WriteZero.into()),
                Poll::Ready(Ok(n)) => {
                    self.pending.drain(..n);
                }
                Poll::Ready(Err(e)) => self.detach(&e),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(())
    }

    fn detach(&mut self, err: &io::Error) {
        warn!(direction = %self.direction, "tap sink detached: {}", err);
        self.writer = None;
        self.pending.clear();
    }

    fn close(&mut self) {
        if self.writer.take().is_some() {
            debug!(direction = %self.direction, "tap sink closed");
        }
        self.pending.clear();
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        let pending = std::mem::take(&mut self.pending);
        let direction = self.direction;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = writer.write_all(&pending).await {
                        warn!(%direction, "tap sink lost {} bytes: {}", pending.len(), e);
                    }
                });
            }
            Err(_) => warn!(%direction, "tap sink lost {} bytes: no runtime to flush them", pending.len()),
        }
    }
}

pub struct TeeConn<T> {
    io: T,
    inbound: Sink,
    outbound: Sink,
    /// Bytes already read from `io` and teed, waiting for the inbound sink to
    /// drain before the caller gets them.
    held: Vec<u8>,
}

impl<T> TeeConn<T> {
    pub fn new(io: T, inbound: PipeWriter, outbound: PipeWriter) -> Self {
        Self {
            io,
            inbound: Sink::new(Direction::Inbound, inbound),
            outbound: Sink::new(Direction::Outbound, outbound),
            held: Vec::new(),
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.io
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.io
    }

    /// Unwraps the connection. Both sinks are closed once their queued bytes
    /// are written; bytes held back from the caller by a stalled inbound sink
    /// are not returned by the connection.
    pub fn into_inner(self) -> T {
        self.io
    }

    pub fn is_tapping(&self, direction: Direction) -> bool {
        match direction {
            Direction::Inbound => self.inbound.is_attached(),
            Direction::Outbound => self.outbound.is_attached(),
        }
    }
}

impl<T> std::fmt::Debug for TeeConn<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeeConn")
            .field("io", &self.io)
            .field("inbound", &self.inbound.is_attached())
            .field("outbound", &self.outbound.is_attached())
            .finish()
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for TeeConn<T> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.inbound.poll_drain(cx));

        if !this.held.is_empty() {
            let n = this.held.len().min(buf.remaining());
            buf.put_slice(&this.held[..n]);
            this.held.drain(..n);
            return Poll::Ready(Ok(()));
        }

        if buf.remaining() == 0 {
            return Pin::new(&mut this.io).poll_read(cx, buf);
        }

        let before = buf.filled().len();
        if let Err(e) = ready!(Pin::new(&mut this.io).poll_read(cx, buf)) {
            this.inbound.close();
            return Poll::Ready(Err(e));
        }

        let read = &buf.filled()[before..];
        if read.is_empty() {
            this.inbound.close();
            return Poll::Ready(Ok(()));
        }

        this.inbound.push(read);
        if this.inbound.poll_drain(cx).is_pending() {
            // the sink registered our waker; hand the bytes out once it drains
            this.held.extend_from_slice(&buf.filled()[before..]);
            buf.set_filled(before);
            return Poll::Pending;
        }
        Poll::Ready(Ok(()))
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for TeeConn<T> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.outbound.poll_drain(cx));

        let n = match ready!(Pin::new(&mut this.io).poll_write(cx, buf)) {
            Ok(n) => n,
            Err(e) => {
                this.outbound.close();
                return Poll::Ready(Err(e));
            }
        };

        this.outbound.push(&buf[..n]);
        let _ = this.outbound.poll_drain(cx);
        Poll::Ready(Ok(n))
    }

    fn poll_write_vectored(self: Pin<&mut Self>, cx: &mut Context<'_>, bufs: &[IoSlice<'_>]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.outbound.poll_drain(cx));

        let n = match ready!(Pin::new(&mut this.io).poll_write_vectored(cx, bufs)) {
            Ok(n) => n,
            Err(e) => {
                this.outbound.close();
                return Poll::Ready(Err(e));
            }
        };

        let mut remaining = n;
        for buf in bufs {
            if remaining == 0 {
                break;
            }
            let taken = remaining.min(buf.len());
            this.outbound.push(&buf[..taken]);
            remaining -= taken;
        }
        let _ = this.outbound.poll_drain(cx);
        Poll::Ready(Ok(n))
    }

    fn is_write_vectored(&self) -> bool {
        self.io.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.outbound.poll_drain(cx));
        Pin::new(&mut this.io).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.outbound.poll_drain(cx));
        let res = ready!(Pin::new(&mut this.io).poll_shutdown(cx));
        this.outbound.close();
        Poll::Ready(res)
    }
}
