use serde::{Deserialize, Serialize};
use url::Url;

use super::{Result, TapError};

pub const APP_NAME: &str = "upgrade-sniffer";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnifferConfig {
    /// Address the proxy listens on
    pub bind: String,
    /// Upstream every request is forwarded to
    pub upstream: String,
    /// Buffer size of each tap pipe, in bytes
    pub pipe_capacity: usize,
    /// Read size used when dumping tapped bytes
    pub dump_chunk_size: usize,
    /// Fallback filter when RUST_LOG is not set
    pub log_filter: String,
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            upstream: "http://echo.websocket.org".to_string(),
            pipe_capacity: 64 * 1024,
            dump_chunk_size: 1024,
            log_filter: "info".to_string(),
        }
    }
}

impl SnifferConfig {
    /// Loads the file, writing defaults if it does not exist yet. Call
    /// [`SnifferConfig::validate`] once command line overrides are applied.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        match path {
            Some(path) => confy::load_path(path),
            None => confy::load(APP_NAME, None),
        }
        .map_err(|e| TapError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipe_capacity == 0 {
            return Err(TapError::InvalidConfig("pipe_capacity must be greater than 0".to_string()));
        }
        if self.dump_chunk_size == 0 {
            return Err(TapError::InvalidConfig(
                "dump_chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.bind.is_empty() {
            return Err(TapError::InvalidConfig("bind address is empty".to_string()));
        }
        self.upstream_url().map(|_| ())
    }

    pub fn upstream_url(&self) -> Result<Url> {
        let url: Url = self
            .upstream
            .parse()
            .map_err(|e| TapError::InvalidUpstream(format!("{}: {}", self.upstream, e)))?;

        match url.scheme() {
            "http" | "ws" => {}
            other => {
                return Err(TapError::InvalidUpstream(format!(
                    "unsupported scheme {} (expected http or ws)",
                    other
                )))
            }
        }

        if url.host_str().is_none() {
            return Err(TapError::InvalidUpstream(format!("{} has no host", self.upstream)));
        }

        Ok(url)
    }
}
