use crate::ScrobbleService;
use async_trait::async_trait;
use scrobble_bridge_core::{ServiceId, ServiceResult, Song};
use tracing::info;

/// Dry-run service: logs every request and accepts it.
pub struct LogService {
    id: ServiceId,
}

impl LogService {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ServiceId::new(id),
        }
    }
}

fn describe(song: &Song) -> String {
    format!(
        "{} - {}",
        song.artist().unwrap_or("<unknown artist>"),
        song.track().unwrap_or("<unknown track>")
    )
}

#[async_trait]
impl ScrobbleService for LogService {
    fn id(&self) -> ServiceId {
        self.id.clone()
    }

    async fn now_playing(&self, song: &Song) -> ServiceResult {
        info!(service = %self.id, song = %describe(song), "now playing");
        ServiceResult::ok(self.id.clone())
    }

    async fn scrobble(&self, song: &Song) -> ServiceResult {
        info!(service = %self.id, song = %describe(song), "scrobble");
        ServiceResult::ok(self.id.clone())
    }

    async fn love(&self, song: &Song, loved: bool) -> ServiceResult {
        info!(service = %self.id, song = %describe(song), loved, "love status");
        ServiceResult::ok(self.id.clone())
    }
}
