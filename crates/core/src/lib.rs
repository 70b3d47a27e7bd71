pub mod config;
pub mod model;
pub mod service;
pub mod urls;

pub use config::{AppConfig, ConfigIntervals, ScrobbleOptions};
pub use model::{Mode, ProcessedInfo, Snapshot, Song, SongFlags, SongMetadata, TrackLinks, UserEdits};
pub use service::{Outcome, ServiceErrorKind, ServiceId, ServiceResult};
