use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::join_all;
use scrobble_bridge_core::{ServiceId, ServiceResult, Snapshot, Song, UserEdits};
use std::sync::Arc;

pub mod enrich;
pub mod log_service;
pub mod source;
pub mod storage;

pub use enrich::BasicEnricher;
pub use log_service::LogService;
pub use source::JsonLinesSource;
pub use storage::MemoryStorage;

/// Pushes playback observations into the controller.
#[async_trait]
pub trait SnapshotSource: Send {
    fn name(&self) -> &'static str;
    /// `Ok(None)` once the source has nothing more to report.
    async fn next_snapshot(&mut self) -> Result<Option<Snapshot>>;
}

/// Fills in missing metadata and decides whether a song is identifiable.
///
/// Implementations mutate the song in place and may take arbitrarily long;
/// the controller works on a copy and drops the result if the song was
/// superseded in the meantime.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn process(&self, song: &mut Song);
}

/// A remote listening-history service. Failures are reported through the
/// returned outcome, never as a Rust error.
#[async_trait]
pub trait ScrobbleService: Send + Sync {
    fn id(&self) -> ServiceId;
    async fn now_playing(&self, song: &Song) -> ServiceResult;
    async fn scrobble(&self, song: &Song) -> ServiceResult;
    async fn love(&self, song: &Song, loved: bool) -> ServiceResult;
}

/// Persistence for songs awaiting a retry and for user edits. Calls are
/// fire-and-forget.
pub trait Storage: Send + Sync {
    fn enqueue(&self, song: Song, services: Vec<ServiceId>);
    fn save_edits(&self, song: &Song, edits: &UserEdits);
    fn remove_edits(&self, song: &Song);
}

/// Summary of one fan-out across the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// At least one service accepted.
    Accepted,
    /// Nobody accepted and every service ignored the request.
    Ignored,
    Failed,
}

pub fn aggregate(results: &[ServiceResult]) -> Aggregate {
    if results.iter().any(ServiceResult::is_ok) {
        Aggregate::Accepted
    } else if !results.is_empty() && results.iter().all(ServiceResult::is_ignored) {
        Aggregate::Ignored
    } else {
        Aggregate::Failed
    }
}

/// Services that neither accepted nor ignored, i.e. the ones worth retrying.
pub fn failed_services(results: &[ServiceResult]) -> Vec<ServiceId> {
    results
        .iter()
        .filter(|r| r.is_error())
        .map(|r| r.service.clone())
        .collect()
}

#[derive(Clone, Default)]
pub struct ServiceRoster {
    services: Vec<Arc<dyn ScrobbleService>>,
}

impl ServiceRoster {
    pub fn new(services: Vec<Arc<dyn ScrobbleService>>) -> Self {
        Self { services }
    }

    pub fn ids(&self) -> Vec<ServiceId> {
        self.services.iter().map(|s| s.id()).collect()
    }

    pub async fn now_playing(&self, song: &Song) -> Vec<ServiceResult> {
        join_all(self.services.iter().map(|s| s.now_playing(song))).await
    }

    pub async fn scrobble(&self, song: &Song) -> Vec<ServiceResult> {
        join_all(self.services.iter().map(|s| s.scrobble(song))).await
    }

    pub async fn love(&self, song: &Song, loved: bool) -> Vec<ServiceResult> {
        join_all(self.services.iter().map(|s| s.love(song, loved))).await
    }
}

/// Builds a dry-run roster from configured service names, keeping their order.
pub fn build_roster(names: &[String]) -> ServiceRoster {
    let mut services: Vec<Arc<dyn ScrobbleService>> = Vec::new();
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        services.push(Arc::new(LogService::new(name)));
    }
    ServiceRoster::new(services)
}

#[cfg(test)]
mod tests {
    use super::{aggregate, build_roster, failed_services, Aggregate};
    use scrobble_bridge_core::{ServiceErrorKind, ServiceId, ServiceResult, Snapshot, Song};

    fn id(name: &str) -> ServiceId {
        ServiceId::from(name)
    }

    #[test]
    fn any_ok_is_accepted_and_errors_are_retried() {
        let results = vec![
            ServiceResult::ok(id("lastfm")),
            ServiceResult::ignored(id("maloja"), "filtered"),
            ServiceResult::error(id("listenbrainz"), ServiceErrorKind::Network),
        ];
        assert_eq!(aggregate(&results), Aggregate::Accepted);
        assert_eq!(failed_services(&results), vec![id("listenbrainz")]);
    }

    #[test]
    fn all_ignored_is_not_a_failure() {
        let results = vec![
            ServiceResult::ignored(id("lastfm"), "too short"),
            ServiceResult::ignored(id("listenbrainz"), "too short"),
        ];
        assert_eq!(aggregate(&results), Aggregate::Ignored);
        assert!(failed_services(&results).is_empty());
    }

    #[test]
    fn ignored_mixed_with_errors_fails() {
        let results = vec![
            ServiceResult::ignored(id("lastfm"), "filtered"),
            ServiceResult::error(id("listenbrainz"), ServiceErrorKind::Auth),
        ];
        assert_eq!(aggregate(&results), Aggregate::Failed);
        assert_eq!(failed_services(&results), vec![id("listenbrainz")]);
        assert_eq!(aggregate(&[]), Aggregate::Failed);
    }

    #[tokio::test]
    async fn roster_fans_out_in_configured_order() {
        let roster = build_roster(&["lastfm".to_string(), " ".to_string(), "listenbrainz".to_string()]);
        assert_eq!(roster.ids(), vec![id("lastfm"), id("listenbrainz")]);

        let song = Song::new(Snapshot::default(), 1);
        let results = roster.scrobble(&song).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].service, id("listenbrainz"));
        assert_eq!(aggregate(&results), Aggregate::Accepted);
    }
}
