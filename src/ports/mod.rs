pub mod hijack;
pub mod observer;
pub mod tracking;

pub use hijack::Hijack;
pub use observer::HijackObserver;
pub use tracking::TrackingPort;
