use crate::domain::{PipeReader, RequestMeta};

/// Receives the tapped streams of every hijacked connection.
///
/// Called on the hijacking task before the connection is handed back, so
/// implementations must return quickly and consume the readers from tasks of
/// their own. A reader that is dropped detaches its side of the tap.
pub trait HijackObserver: Send + Sync {
    fn on_hijacked(&self, request: &RequestMeta, inbound: PipeReader, outbound: PipeReader);
}

impl<F> HijackObserver for F
where
    F: Fn(&RequestMeta, PipeReader, PipeReader) + Send + Sync,
{
    fn on_hijacked(&self, request: &RequestMeta, inbound: PipeReader, outbound: PipeReader) {
        self(request, inbound, outbound)
    }
}
