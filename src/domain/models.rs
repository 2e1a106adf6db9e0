use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use uuid::Uuid;

/// Snapshot of the request that led to a hijack, handed to observers.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub id: Uuid,
    pub method: String,
    pub uri: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub remote_addr: Option<SocketAddr>,
}

impl RequestMeta {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.into(),
            uri: uri.into(),
            version: "HTTP/1.1".to_string(),
            headers: HashMap::new(),
            remote_addr: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_remote_addr(mut self, remote_addr: Option<SocketAddr>) -> Self {
        self.remote_addr = remote_addr;
        self
    }

    /// Peer address for log lines, `-` when the server loop did not provide one.
    pub fn remote(&self) -> String {
        self.remote_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}

/// Direction of tapped bytes relative to the hijacked socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Bytes read from the socket (what the client sent).
    Inbound,
    /// Bytes written to the socket (what was sent back to the client).
    Outbound,
}

impl Direction {
    pub fn symbol(&self) -> &'static str {
        match self {
            Direction::Inbound => "<",
            Direction::Outbound => ">",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// Byte counts observed by the consumers of a tap session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TapStats {
    pub inbound_bytes: u64,
    pub outbound_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: Uuid,
    pub method: String,
    pub target: String,
    pub remote: String,
    pub stats: TapStats,
    pub opened_at: Instant,
    pub closed_at: Option<Instant>,
}

impl SessionInfo {
    pub fn new(request: &RequestMeta) -> Self {
        Self {
            id: request.id,
            method: request.method.clone(),
            target: request.uri.clone(),
            remote: request.remote(),
            stats: TapStats::default(),
            opened_at: Instant::now(),
            closed_at: None,
        }
    }

    pub fn close(&mut self, stats: TapStats) {
        self.stats = stats;
        self.closed_at = Some(Instant::now());
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}
