//! Failure type for tool handlers.

use thiserror::Error;

/// Errors a tool handler can surface. The dispatcher converts every variant
/// into a failed result envelope, so none of these cross the dispatch
/// boundary as a panic or a transport error.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Filesystem or subprocess I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An outbound HTTP request failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A payload could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Handler-specific failure with a caller-facing message.
    #[error("{0}")]
    Failed(String),
}

/// Convenience alias for tool handler results.
pub type ToolOutcome<T> = Result<T, ToolError>;
