use scrobble_bridge_core::{Mode, Song};
use tracing::{debug, info};

/// Receives controller events. Calls are made synchronously after the
/// controller has released its state, in the order the events happened.
/// Implementations must not call back into the controller from these hooks.
pub trait ControllerListener: Send + Sync {
    fn on_mode_changed(&self, mode: Mode);
    fn on_song_updated(&self, song: Option<&Song>);
    fn on_now_playing(&self, song: &Song);
}

/// Writes every event to the tracing log.
#[derive(Debug, Default)]
pub struct LogListener;

impl ControllerListener for LogListener {
    fn on_mode_changed(&self, mode: Mode) {
        info!(%mode, "mode changed");
    }

    fn on_song_updated(&self, song: Option<&Song>) {
        match song {
            Some(song) => debug!(
                key = %song.key(),
                position = ?song.parsed().current_time,
                playing = song.parsed().is_playing,
                "song updated"
            ),
            None => debug!("song cleared"),
        }
    }

    fn on_now_playing(&self, song: &Song) {
        info!(
            artist = song.artist().unwrap_or("?"),
            track = song.track().unwrap_or("?"),
            valid = song.is_valid(),
            "now playing"
        );
    }
}
