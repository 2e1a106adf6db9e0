use crate::domain::{Result, SessionInfo, TapStats};
use crate::ports::TrackingPort;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::info;
use uuid::Uuid;

/// Keeps tap sessions around until a few seconds after they closed.
pub struct SessionTracker {
    sessions: Arc<RwLock<Vec<SessionInfo>>>,
    retention: Duration,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Vec::new())),
            retention: Duration::from_secs(4),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Start background cleanup task
    pub fn start_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let sessions = self.sessions.clone();
        let retention = self.retention;

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(250));

            loop {
                ticker.tick().await;

                let mut sessions = sessions.write().await;
                let now = Instant::now();

                sessions.retain(|session| match session.closed_at {
                    Some(closed_at) => now.duration_since(closed_at) < retention,
                    None => true,
                });
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackingPort for SessionTracker {
    async fn track_session(&self, info: SessionInfo) -> Result<()> {
        info!(id = %info.id, "{} {} tapped (from {})", info.method, info.target, info.remote);

        let mut sessions = self.sessions.write().await;
        sessions.push(info);

        Ok(())
    }

    async fn close_session(&self, id: Uuid, stats: TapStats) -> Result<()> {
        let mut sessions = self.sessions.write().await;

        if let Some(session) = sessions.iter_mut().find(|s| s.id == id) {
            session.close(stats);
            info!(
                id = %id,
                "{} {} closed: {} bytes in, {} bytes out",
                session.method,
                session.target,
                stats.inbound_bytes,
                stats.outbound_bytes
            );
        }

        Ok(())
    }

    async fn get_active_sessions(&self) -> Result<Vec<SessionInfo>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.iter().filter(|s| s.is_open()).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RequestMeta;

    #[tokio::test]
    async fn test_track_and_close_session() {
        let tracker = SessionTracker::new();
        let info = SessionInfo::new(&RequestMeta::new("GET", "/ws"));
        let id = info.id;

        tracker.track_session(info).await.unwrap();
        assert_eq!(tracker.get_active_sessions().await.unwrap().len(), 1);

        let stats = TapStats {
            inbound_bytes: 10,
            outbound_bytes: 20,
        };
        tracker.close_session(id, stats).await.unwrap();

        assert!(tracker.get_active_sessions().await.unwrap().is_empty());
        assert_eq!(tracker.len().await, 1);
    }

    #[tokio::test]
    async fn test_closing_unknown_session_is_ignored() {
        let tracker = SessionTracker::new();
        tracker.close_session(Uuid::new_v4(), TapStats::default()).await.unwrap();
        assert_eq!(tracker.len().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_drops_closed_sessions() {
        let tracker = SessionTracker::new().with_retention(Duration::from_millis(10));
        let open = SessionInfo::new(&RequestMeta::new("GET", "/open"));
        let closed = SessionInfo::new(&RequestMeta::new("GET", "/closed"));
        let closed_id = closed.id;

        tracker.track_session(open).await.unwrap();
        tracker.track_session(closed).await.unwrap();
        tracker.close_session(closed_id, TapStats::default()).await.unwrap();

        let cleanup = tracker.start_cleanup();
        tokio::time::sleep(Duration::from_millis(400)).await;
        cleanup.abort();

        assert_eq!(tracker.len().await, 1);
        assert_eq!(tracker.get_active_sessions().await.unwrap()[0].target, "/open");
    }
}
