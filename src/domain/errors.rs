use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapError {
    InvalidUpstream(String),
    InvalidConfig(String),
    Config(String),
    Bind(String),
    Upstream(String),
    InvalidRequest(String),
}

impl fmt::Display for TapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TapError::InvalidUpstream(msg) => write!(f, "Invalid upstream: {}", msg),
            TapError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            TapError::Config(msg) => write!(f, "Failed to load configuration: {}", msg),
            TapError::Bind(msg) => write!(f, "Failed to bind listener: {}", msg),
            TapError::Upstream(msg) => write!(f, "Upstream error: {}", msg),
            TapError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
        }
    }
}

impl std::error::Error for TapError {}

pub type Result<T> = std::result::Result<T, TapError>;
