pub mod hexdump;
pub mod hyper_server;
pub mod tracking;

pub use hexdump::HexDumpObserver;
pub use hyper_server::{serve, ReverseProxy, Sniffer};
pub use tracking::SessionTracker;
