//! Meeting domain error taxonomy.
//!
//! Every failure a meeting operation can surface maps to one variant here.
//! The CLI layer wraps these in `anyhow` with context; library code returns
//! them directly so callers can branch on the kind (e.g. refetch on
//! `Conflict`).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeetingError {
    /// Malformed input, rejected before any state change.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Wrong actor for the requested transition.
    #[error("Not allowed: {0}")]
    Authorization(String),

    /// The meeting is no longer in the expected state. Refetch and retry.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Meeting not found: {0}")]
    NotFound(String),

    /// Join attempted on a meeting that is not ongoing.
    #[error("Meeting cannot be joined: {0}")]
    NotJoinable(String),

    /// Join attempted by someone who is not a party to the meeting.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Session credentials were issued but the media transport failed.
    #[error("Media transport failed: {0}")]
    TransportFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Operation cancelled")]
    Cancelled,

    /// No usable session (missing or expired token that could not be refreshed).
    #[error("Session error: {0}")]
    Session(String),

    /// Server reported a failure that fits no other kind.
    #[error("API error: {0}")]
    Api(String),
}

impl MeetingError {
    /// Connectivity-class failures the user may simply try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MeetingError::Network(_) | MeetingError::Timeout(_))
    }

    /// Map a failed envelope to the taxonomy using the HTTP status as a hint.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 | 422 => MeetingError::Validation(message),
            401 => MeetingError::Session(message),
            403 => MeetingError::Authorization(message),
            404 => MeetingError::NotFound(message),
            409 => MeetingError::Conflict(message),
            _ => MeetingError::Api(message),
        }
    }
}

impl From<reqwest::Error> for MeetingError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest does not expose the configured duration on the error
            MeetingError::Network(format!("request timed out: {}", e))
        } else if e.is_decode() {
            MeetingError::Api(format!("malformed response: {}", e))
        } else {
            MeetingError::Network(e.to_string())
        }
    }
}
