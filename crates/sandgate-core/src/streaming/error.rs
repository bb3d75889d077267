//! Failure type for session-manager operations.
//!
//! Most failures surface as scoped [`SessionEvent`]s on the session's own
//! feed rather than as errors here, so the session survives them.
//!
//! [`SessionEvent`]: super::events::SessionEvent

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamingError {
    /// The referenced session does not exist or was already torn down.
    #[error("unknown session: {0}")]
    SessionNotFound(String),
}

pub type StreamingResult<T> = Result<T, StreamingError>;
