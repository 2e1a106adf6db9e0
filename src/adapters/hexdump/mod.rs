//! Observer logging every tapped chunk as lowercase hex.
//!
//! Each hijack gets two reader tasks, one per direction, and a supervisor that
//! records the session in the tracker and closes it once both readers hit
//! end-of-stream. The readers stop when the tapped connection closes its side
//! of the pipe, so a finished connection leaves no task behind.

use std::fmt;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{Direction, PipeReader, RequestMeta, SessionInfo, TapStats};
use crate::ports::{HijackObserver, TrackingPort};

pub const DEFAULT_CHUNK_SIZE: usize = 1024;

pub struct HexDumpObserver {
    tracker: Arc<dyn TrackingPort>,
    chunk_size: usize,
}

impl HexDumpObserver {
    pub fn new(tracker: Arc<dyn TrackingPort>) -> Self {
        Self {
            tracker,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl HijackObserver for HexDumpObserver {
    fn on_hijacked(&self, request: &RequestMeta, inbound: PipeReader, outbound: PipeReader) {
        let inbound = spawn_reader(request, inbound, Direction::Inbound, self.chunk_size);
        let outbound = spawn_reader(request, outbound, Direction::Outbound, self.chunk_size);

        let tracker = self.tracker.clone();
        let info = SessionInfo::new(request);
        tokio::spawn(async move {
            let id = info.id;
            if let Err(e) = tracker.track_session(info).await {
                warn!(id = %id, "Failed to track tap session: {}", e);
            }

            let (inbound_bytes, outbound_bytes) = futures::join!(inbound, outbound);
            let stats = TapStats {
                inbound_bytes: inbound_bytes.unwrap_or_default(),
                outbound_bytes: outbound_bytes.unwrap_or_default(),
            };

            if let Err(e) = tracker.close_session(id, stats).await {
                warn!(id = %id, "Failed to close tap session: {}", e);
            }
        });
    }
}

fn spawn_reader(request: &RequestMeta, reader: PipeReader, direction: Direction, chunk_size: usize) -> JoinHandle<u64> {
    let remote = request.remote();
    tokio::spawn(read_loop(remote, reader, direction, chunk_size))
}

/// Logs chunks until the pipe ends. Returns the number of bytes seen.
async fn read_loop(remote: String, mut reader: PipeReader, direction: Direction, chunk_size: usize) -> u64 {
    let mut data = vec![0u8; chunk_size];
    let mut total = 0u64;

    loop {
        match reader.read(&mut data).await {
            Ok(0) => {
                debug!(%direction, "{} tap ended after {} bytes", remote, total);
                return total;
            }
            Ok(n) => {
                total += n as u64;
                info!("{} {}: {}", direction.symbol(), remote, Hex(&data[..n]));
            }
            Err(e) => {
                warn!(%direction, "{} tap read failed: {}", remote, e);
                return total;
            }
        }
    }
}

/// Lowercase hex rendering of a byte slice.
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
