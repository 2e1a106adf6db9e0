//! Transparent tap for connections hijacked through HTTP upgrades.
//!
//! [`adapters::Sniffer`] wraps any request handler. Every request that can be
//! upgraded gets its upgrade handle replaced by a [`domain::TapHijacker`]; when
//! the handler hijacks the connection, the observer receives two readers
//! mirroring what the client sent and what was sent back, and the handler gets
//! a [`domain::TeeConn`] that behaves like the raw socket.

pub mod adapters;
pub mod domain;
pub mod ports;
