use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a remote listening-history service, e.g. `lastfm`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(pub String);

impl ServiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceErrorKind {
    Auth,
    Network,
    RateLimited,
    Other(String),
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceErrorKind::Auth => f.write_str("authentication failed"),
            ServiceErrorKind::Network => f.write_str("network error"),
            ServiceErrorKind::RateLimited => f.write_str("rate limited"),
            ServiceErrorKind::Other(msg) => f.write_str(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Ok,
    /// The service understood the request but chose not to record it.
    Ignored(String),
    Error(ServiceErrorKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceResult {
    pub service: ServiceId,
    pub outcome: Outcome,
}

impl ServiceResult {
    pub fn ok(service: ServiceId) -> Self {
        Self {
            service,
            outcome: Outcome::Ok,
        }
    }

    pub fn ignored(service: ServiceId, reason: impl Into<String>) -> Self {
        Self {
            service,
            outcome: Outcome::Ignored(reason.into()),
        }
    }

    pub fn error(service: ServiceId, kind: ServiceErrorKind) -> Self {
        Self {
            service,
            outcome: Outcome::Error(kind),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Ok)
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self.outcome, Outcome::Ignored(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }
}
