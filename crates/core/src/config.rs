use serde::{Deserialize, Serialize};

fn default_schema_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigIntervals {
    pub file_watch_poll_ms: u64,
}

impl Default for ConfigIntervals {
    fn default() -> Self {
        Self {
            file_watch_poll_ms: 10_000,
        }
    }
}

/// Rules deciding when a session counts as played.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrobbleOptions {
    /// Share of the track duration (0-100) that must be played.
    pub percent: u8,
    /// Absolute cap on the reporting threshold, whatever the duration.
    pub max_scrobble_secs: u64,
    pub scrobble_podcasts: bool,
    /// Playback positions below this, once the replay timer expired, start a replay.
    pub replay_window_secs: u64,
}

impl Default for ScrobbleOptions {
    fn default() -> Self {
        Self {
            percent: 50,
            max_scrobble_secs: 240,
            scrobble_podcasts: true,
            replay_window_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub enabled: bool,
    pub services: Vec<String>,
    pub log_level: String,
    #[serde(default)]
    pub scrobble: ScrobbleOptions,
    #[serde(default)]
    pub intervals: ConfigIntervals,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            enabled: true,
            services: vec!["lastfm".to_string(), "listenbrainz".to_string()],
            log_level: "info".to_string(),
            scrobble: ScrobbleOptions::default(),
            intervals: ConfigIntervals::default(),
        }
    }
}
