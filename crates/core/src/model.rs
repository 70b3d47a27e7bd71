use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Externally observable summary of what the controller is doing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Mode {
    Disabled,
    #[default]
    Base,
    Loading,
    Playing,
    Scrobbled,
    Ignored,
    Skipped,
    Unknown,
    Err,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Disabled => "disabled",
            Mode::Base => "base",
            Mode::Loading => "loading",
            Mode::Playing => "playing",
            Mode::Scrobbled => "scrobbled",
            Mode::Ignored => "ignored",
            Mode::Skipped => "skipped",
            Mode::Unknown => "unknown",
            Mode::Err => "err",
        };
        f.write_str(name)
    }
}

/// One sampled observation of the external player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub artist: Option<String>,
    pub track: Option<String>,
    pub album: Option<String>,
    pub unique_id: Option<String>,
    /// Playback position in seconds.
    pub current_time: Option<f64>,
    /// Track length in seconds.
    pub duration: Option<f64>,
    pub is_playing: bool,
    pub is_podcast: bool,
    pub track_art: Option<String>,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl Snapshot {
    /// Not enough identity to track: no unique id and no artist/track pair.
    pub fn is_empty(&self) -> bool {
        !present(&self.unique_id) && !(present(&self.artist) && present(&self.track))
    }

    pub fn is_same_item(&self, other: &Snapshot) -> bool {
        self.artist == other.artist
            && self.track == other.track
            && self.album == other.album
            && self.unique_id == other.unique_id
    }
}

/// Metadata resolved by the enrichment pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedInfo {
    pub artist: Option<String>,
    pub track: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub duration: Option<f64>,
}

/// Identity fields supplied by the user; they win over anything detected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserEdits {
    pub artist: Option<String>,
    pub track: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
}

impl UserEdits {
    pub fn is_empty(&self) -> bool {
        self.artist.is_none()
            && self.track.is_none()
            && self.album.is_none()
            && self.album_artist.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongFlags {
    pub is_skipped: bool,
    pub is_scrobbled: bool,
    pub is_marked_as_playing: bool,
    pub is_replaying: bool,
    pub is_valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TrackLinks {
    pub lastfm: Option<String>,
    pub musicbrainz_search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongMetadata {
    pub user_loved: Option<bool>,
    pub links: TrackLinks,
    pub started_at: SystemTime,
}

/// The controller's working record of the item being played.
///
/// Identity taken from the first snapshot never changes; timing fields follow
/// later snapshots of the same item. Flags only ever move forward: a scrobbled
/// song stays scrobbled and a skipped song stays skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    parsed: Snapshot,
    flags: SongFlags,
    generation: u64,
    pub processed: ProcessedInfo,
    pub user_edits: Option<UserEdits>,
    pub metadata: SongMetadata,
}

impl Song {
    pub fn new(snapshot: Snapshot, generation: u64) -> Self {
        Self {
            parsed: snapshot,
            flags: SongFlags::default(),
            generation,
            processed: ProcessedInfo::default(),
            user_edits: None,
            metadata: SongMetadata {
                user_loved: None,
                links: TrackLinks::default(),
                started_at: SystemTime::now(),
            },
        }
    }

    pub fn parsed(&self) -> &Snapshot {
        &self.parsed
    }

    pub fn flags(&self) -> SongFlags {
        self.flags
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Copies timing and presentation fields from a snapshot of the same item.
    /// Returns `true` when the reported duration changed.
    pub fn apply_timing(&mut self, snapshot: &Snapshot) -> bool {
        let duration_changed =
            snapshot.duration.is_some() && snapshot.duration != self.parsed.duration;
        self.parsed.current_time = snapshot.current_time;
        self.parsed.is_playing = snapshot.is_playing;
        self.parsed.track_art = snapshot.track_art.clone();
        if duration_changed {
            self.parsed.duration = snapshot.duration;
        }
        duration_changed
    }

    pub fn artist(&self) -> Option<&str> {
        self.resolve(
            |e| e.artist.as_deref(),
            |p| p.artist.as_deref(),
            self.parsed.artist.as_deref(),
        )
    }

    pub fn track(&self) -> Option<&str> {
        self.resolve(
            |e| e.track.as_deref(),
            |p| p.track.as_deref(),
            self.parsed.track.as_deref(),
        )
    }

    pub fn album(&self) -> Option<&str> {
        self.resolve(
            |e| e.album.as_deref(),
            |p| p.album.as_deref(),
            self.parsed.album.as_deref(),
        )
    }

    pub fn album_artist(&self) -> Option<&str> {
        self.resolve(
            |e| e.album_artist.as_deref(),
            |p| p.album_artist.as_deref(),
            None,
        )
    }

    /// Best known duration in seconds, enrichment first.
    pub fn duration(&self) -> Option<f64> {
        self.processed.duration.or(self.parsed.duration)
    }

    /// Key under which user edits for this item are stored.
    pub fn key(&self) -> String {
        match &self.parsed.unique_id {
            Some(id) => id.clone(),
            None => format!(
                "{} - {}",
                self.parsed.artist.as_deref().unwrap_or_default(),
                self.parsed.track.as_deref().unwrap_or_default()
            ),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.flags.is_valid
    }

    pub fn set_valid(&mut self, valid: bool) {
        self.flags.is_valid = valid;
    }

    pub fn mark_scrobbled(&mut self) {
        self.flags.is_scrobbled = true;
    }

    pub fn mark_skipped(&mut self) {
        self.flags.is_skipped = true;
    }

    pub fn mark_replaying(&mut self) {
        self.flags.is_replaying = true;
    }

    pub fn set_marked_as_playing(&mut self, marked: bool) {
        self.flags.is_marked_as_playing = marked;
    }

    /// Drops enrichment output so the next pass starts from the parsed fields.
    pub fn clear_processed(&mut self) {
        self.processed = ProcessedInfo::default();
        self.metadata.links = TrackLinks::default();
        self.flags.is_valid = false;
    }

    fn resolve<'a>(
        &'a self,
        edit: impl Fn(&'a UserEdits) -> Option<&'a str>,
        processed: impl Fn(&'a ProcessedInfo) -> Option<&'a str>,
        parsed: Option<&'a str>,
    ) -> Option<&'a str> {
        self.user_edits
            .as_ref()
            .and_then(edit)
            .or_else(|| processed(&self.processed))
            .or(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::{Snapshot, Song, UserEdits};

    fn snapshot() -> Snapshot {
        Snapshot {
            artist: Some("Artist".to_string()),
            track: Some("Track".to_string()),
            album: Some("Album".to_string()),
            unique_id: Some("id-1".to_string()),
            current_time: Some(12.0),
            duration: Some(200.0),
            is_playing: true,
            is_podcast: false,
            track_art: Some("https://example.com/a.jpg".to_string()),
        }
    }

    #[test]
    fn timing_fields_do_not_change_identity() {
        let a = snapshot();
        let mut b = a.clone();
        b.current_time = Some(99.0);
        b.is_playing = false;
        b.track_art = None;
        b.duration = Some(201.0);
        assert!(a.is_same_item(&b));
    }

    #[test]
    fn any_identity_field_changes_the_item() {
        let a = snapshot();
        let variants: [fn(&mut Snapshot); 4] = [
            |s| s.artist = Some("Other".to_string()),
            |s| s.track = None,
            |s| s.album = Some("Other".to_string()),
            |s| s.unique_id = None,
        ];
        for change in variants {
            let mut b = a.clone();
            change(&mut b);
            assert!(!a.is_same_item(&b));
        }
    }

    #[test]
    fn empty_needs_id_or_artist_and_track() {
        assert!(Snapshot::default().is_empty());
        assert!(Snapshot {
            artist: Some("Artist".to_string()),
            track: Some("  ".to_string()),
            ..Snapshot::default()
        }
        .is_empty());
        assert!(!Snapshot {
            unique_id: Some("x".to_string()),
            ..Snapshot::default()
        }
        .is_empty());
        assert!(!snapshot().is_empty());
    }

    #[test]
    fn user_edits_win_over_processed_and_parsed() {
        let mut song = Song::new(snapshot(), 1);
        song.processed.artist = Some("Processed".to_string());
        song.processed.track = Some("Processed Track".to_string());
        assert_eq!(song.artist(), Some("Processed"));

        song.user_edits = Some(UserEdits {
            artist: Some("Edited".to_string()),
            ..UserEdits::default()
        });
        assert_eq!(song.artist(), Some("Edited"));
        assert_eq!(song.track(), Some("Processed Track"));
        assert_eq!(song.album(), Some("Album"));
    }

    #[test]
    fn apply_timing_reports_duration_changes_only() {
        let mut song = Song::new(snapshot(), 1);
        let mut next = snapshot();
        next.current_time = Some(40.0);
        assert!(!song.apply_timing(&next));
        assert_eq!(song.parsed().current_time, Some(40.0));

        next.duration = Some(180.0);
        assert!(song.apply_timing(&next));
        assert_eq!(song.duration(), Some(180.0));

        next.duration = None;
        assert!(!song.apply_timing(&next));
        assert_eq!(song.duration(), Some(180.0));
    }
}
