use crate::Storage;
use scrobble_bridge_core::{ServiceId, Song, UserEdits};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct QueuedSong {
    pub song: Song,
    pub services: Vec<ServiceId>,
}

/// Keeps deferred reports and user edits for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    queue: Mutex<Vec<QueuedSong>>,
    edits: Mutex<HashMap<String, UserEdits>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queued(&self) -> Vec<QueuedSong> {
        lock(&self.queue).clone()
    }

    pub fn edits_for(&self, key: &str) -> Option<UserEdits> {
        lock(&self.edits).get(key).cloned()
    }
}

impl Storage for MemoryStorage {
    fn enqueue(&self, song: Song, services: Vec<ServiceId>) {
        info!(key = %song.key(), services = ?services, "queued song for deferred reporting");
        lock(&self.queue).push(QueuedSong { song, services });
    }

    fn save_edits(&self, song: &Song, edits: &UserEdits) {
        debug!(key = %song.key(), "saving user edits");
        lock(&self.edits).insert(song.key(), edits.clone());
    }

    fn remove_edits(&self, song: &Song) {
        debug!(key = %song.key(), "removing user edits");
        lock(&self.edits).remove(&song.key());
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStorage;
    use crate::Storage;
    use scrobble_bridge_core::{ServiceId, Snapshot, Song, UserEdits};
    use std::sync::Arc;

    #[test]
    fn keeps_queue_order_and_edits_by_key() {
        let storage = MemoryStorage::new();
        let song = Song::new(
            Snapshot {
                unique_id: Some("abc".to_string()),
                ..Snapshot::default()
            },
            1,
        );

        storage.enqueue(song.clone(), vec![ServiceId::from("lastfm")]);
        storage.enqueue(song.clone(), vec![ServiceId::from("listenbrainz")]);
        let queued = storage.queued();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[1].services, vec![ServiceId::from("listenbrainz")]);

        let edits = UserEdits {
            artist: Some("Fixed".to_string()),
            ..UserEdits::default()
        };
        storage.save_edits(&song, &edits);
        assert_eq!(storage.edits_for("abc"), Some(edits));
        storage.remove_edits(&song);
        assert_eq!(storage.edits_for("abc"), None);
    }

    #[test]
    fn poisoned_queue_still_accepts_songs() {
        let storage = Arc::new(MemoryStorage::new());
        let holder = storage.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.queue.lock().unwrap();
            panic!("worker died while holding the queue");
        })
        .join();
        assert!(storage.queue.is_poisoned());

        storage.enqueue(Song::new(Snapshot::default(), 1), vec![ServiceId::from("lastfm")]);
        assert_eq!(storage.queued().len(), 1);
    }
}
