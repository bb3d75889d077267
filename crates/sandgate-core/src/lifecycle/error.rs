//! Error types for lifecycle operations.

/// Typed failures from the container engine or the state machine.
///
/// Nothing here retries; callers decide what an unavailable engine or a
/// conflicting transition means for them.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The engine could not be reached or answered with a transport error.
    #[error("container engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The requested transition conflicts with current state, for example
    /// checkpointing while no container exists or creating over a live name.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The named container, image, or checkpoint does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The spec was rejected before reaching the engine.
    #[error("invalid sandbox spec: {0}")]
    InvalidSpec(String),
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;
