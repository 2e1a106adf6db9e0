mod reverse_proxy;
mod server;
mod sniffer;
pub mod upgrade;

pub use reverse_proxy::{Body, ReverseProxy};
pub use server::serve;
pub use sniffer::{install_tap, PeerAddr, Sniffer, DEFAULT_PIPE_CAPACITY};
pub use upgrade::{HijackedConn, PendingUpgrade, UpgradeError};
