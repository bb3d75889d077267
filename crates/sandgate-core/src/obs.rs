//! Structured observability hooks for sandbox control-plane events.
//!
//! This module provides:
//! - Session-scoped tracing spans via the `SessionSpan` RAII guard
//! - Emission functions for key events: session auth, subscriptions,
//!   command execution, gate rejections, lifecycle transitions
//!
//! Events are emitted at `info!` level (configurable via `SANDGATE_LOG`).
//! For JSON output, set `SANDGATE_LOG_FORMAT=json`.

use tracing::{info, warn};

/// RAII guard that enters a session-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = SessionSpan::enter("session-12345");
/// // All tracing calls are now associated with session_id = "session-12345"
/// ```
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    /// Create and enter a span tagged with the session id.
    pub fn enter(session_id: &str) -> Self {
        let span = tracing::info_span!("sandgate.session", session_id = %session_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a streaming session connected.
pub fn emit_session_opened(session_id: &str) {
    info!(event = "session.opened", session_id = %session_id);
}

/// Emit event: a session presented a valid credential.
pub fn emit_session_authenticated(session_id: &str, subject: &str) {
    info!(event = "session.authenticated", session_id = %session_id, subject = %subject);
}

/// Emit event: a session disconnected and released its relays.
pub fn emit_session_closed(session_id: &str, relays_released: usize) {
    info!(
        event = "session.closed",
        session_id = %session_id,
        relays_released = relays_released,
    );
}

/// Emit event: a session subscribed to a container's output.
pub fn emit_subscription_started(session_id: &str, container_id: &str) {
    info!(
        event = "stream.subscribed",
        session_id = %session_id,
        container_id = %container_id,
    );
}

/// Emit event: a one-shot command started inside a container.
pub fn emit_command_started(session_id: &str, container_id: &str, command: &str) {
    info!(
        event = "command.started",
        session_id = %session_id,
        container_id = %container_id,
        command = %command,
    );
}

/// Emit event: a one-shot command finished with an exit code.
pub fn emit_command_completed(session_id: &str, container_id: &str, exit_code: i64) {
    info!(
        event = "command.completed",
        session_id = %session_id,
        container_id = %container_id,
        exit_code = exit_code,
    );
}

/// Emit event: the capability gate rejected a tool call (warning level).
pub fn emit_gate_rejected(tool: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "gate.rejected", tool = %tool, reason = %reason);
}

/// Emit event: a tool call ran to completion.
pub fn emit_tool_invoked(tool: &str, request_id: &str, success: bool) {
    info!(
        event = "tool.invoked",
        tool = %tool,
        request_id = %request_id,
        success = success,
    );
}
