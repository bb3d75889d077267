//! Wire events emitted to streaming clients.

use serde::{Deserialize, Serialize};

/// What a scoped error event refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorScope {
    /// An output subscription on one container.
    Subscription { container_id: String },
    /// One in-flight command execution.
    Command { command_id: String },
}

/// Server-emitted session events.
///
/// Output chunks are tagged with the container or command they belong to;
/// clients must discard chunks tagged with a container id they no longer
/// track (for example after a checkpoint restore replaced the container).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Credential accepted; the session may now subscribe and run commands.
    Authenticated { subject: String },
    /// Credential rejected; the transport stays open so the client may retry.
    AuthenticationFailed { reason: String },
    /// An action was refused because the session is not authenticated.
    Rejected { action: String, reason: String },
    /// Subscription acknowledged; container output follows.
    Subscribed { container_id: String },
    /// One chunk of combined stdout/stderr from a subscribed container.
    ContainerOutput { container_id: String, chunk: String },
    /// One chunk of output from a command started via `run_command`.
    CommandOutput {
        command_id: String,
        container_id: String,
        chunk: String,
    },
    /// Terminal event for a command; emitted exactly once per command.
    CommandCompleted {
        command_id: String,
        container_id: String,
        exit_code: i64,
    },
    /// Failure scoped to one subscription or command; the session survives.
    Error { scope: ErrorScope, message: String },
}
