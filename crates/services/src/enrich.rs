use crate::Enricher;
use async_trait::async_trait;
use scrobble_bridge_core::{urls, Song};
use tracing::debug;

/// Takes the player's fields at face value.
///
/// A song is valid once it has both an artist and a track after user edits
/// are applied. The duration is left to the player.
#[derive(Debug, Default, Clone)]
pub struct BasicEnricher;

impl BasicEnricher {
    pub fn new() -> Self {
        Self
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Enricher for BasicEnricher {
    async fn process(&self, song: &mut Song) {
        let parsed = song.parsed().clone();
        song.processed.artist = clean(parsed.artist.as_deref());
        song.processed.track = clean(parsed.track.as_deref());
        song.processed.album = clean(parsed.album.as_deref());

        let identity = song
            .artist()
            .zip(song.track())
            .map(|(artist, track)| (artist.to_string(), track.to_string()));
        let Some((artist, track)) = identity else {
            debug!(key = %song.key(), "song lacks artist or track; leaving invalid");
            song.set_valid(false);
            return;
        };

        song.metadata.links.lastfm = Some(urls::lastfm_track_url(&artist, &track));
        song.metadata.links.musicbrainz_search = Some(urls::musicbrainz_search_url(&artist, &track));
        song.set_valid(true);
    }
}
