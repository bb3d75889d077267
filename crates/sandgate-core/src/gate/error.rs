//! Rejection type produced by the capability gate.

/// A failed gate check. The display string is what callers see in the
/// failure envelope; it names the offending rule, never the policy internals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateRejection {
    #[error("path rejected: {reason}")]
    Path { reason: String },

    #[error("command rejected: {reason}")]
    Command { reason: String },

    #[error("package rejected: {reason}")]
    Package { reason: String },

    #[error("url rejected: {reason}")]
    Url { reason: String },

    #[error("arguments rejected: {reason}")]
    Arguments { reason: String },
}

/// Result type for gate checks.
pub type GateResult<T> = std::result::Result<T, GateRejection>;
