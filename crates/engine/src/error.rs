use thiserror::Error;

/// Operations rejected because the controller is not in a state that allows them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("no song is being tracked")]
    NoActiveSession,
    #[error("song was already scrobbled")]
    AlreadyScrobbled,
    #[error("song has not been identified")]
    InvalidSession,
    #[error("song was skipped")]
    SkippedSession,
}
