pub mod config;
pub mod errors;
pub mod hijacker;
pub mod models;
pub mod pipe;
pub mod tee;

pub use config::SnifferConfig;
pub use errors::*;
pub use hijacker::TapHijacker;
pub use models::*;
pub use pipe::{pipe, PipeReader, PipeWriter};
pub use tee::TeeConn;
