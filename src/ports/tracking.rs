use crate::domain::{Result, SessionInfo, TapStats};
use async_trait::async_trait;
use uuid::Uuid;

/// Port for tracking tap sessions
#[async_trait]
pub trait TrackingPort: Send + Sync {
    /// Register a newly hijacked session
    async fn track_session(&self, info: SessionInfo) -> Result<()>;

    /// Mark a session as closed once both directions ended
    async fn close_session(&self, id: Uuid, stats: TapStats) -> Result<()>;

    /// Get all sessions still being tapped
    async fn get_active_sessions(&self) -> Result<Vec<SessionInfo>>;
}
