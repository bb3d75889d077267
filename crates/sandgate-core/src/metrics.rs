//! Global atomic counters for sandbox control-plane observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. on daemon shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations, no locking.
pub struct Metrics {
    tool_calls: AtomicU64,
    tool_rejections: AtomicU64,
    tool_failures: AtomicU64,
    lifecycle_transitions: AtomicU64,
    checkpoints_taken: AtomicU64,
    sessions_opened: AtomicU64,
    commands_executed: AtomicU64,
    chunks_relayed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            tool_calls: AtomicU64::new(0),
            tool_rejections: AtomicU64::new(0),
            tool_failures: AtomicU64::new(0),
            lifecycle_transitions: AtomicU64::new(0),
            checkpoints_taken: AtomicU64::new(0),
            sessions_opened: AtomicU64::new(0),
            commands_executed: AtomicU64::new(0),
            chunks_relayed: AtomicU64::new(0),
        }
    }

    /// Increment the tool-calls counter by one.
    pub fn inc_tool_calls(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tool_calls", "counter incremented");
    }

    /// Increment the gate-rejections counter by one.
    pub fn inc_tool_rejections(&self) {
        self.tool_rejections.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tool_rejections", "counter incremented");
    }

    /// Increment the handler-failures counter by one.
    pub fn inc_tool_failures(&self) {
        self.tool_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tool_failures", "counter incremented");
    }

    /// Increment the lifecycle-transitions counter by one.
    pub fn inc_lifecycle_transitions(&self) {
        self.lifecycle_transitions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "lifecycle_transitions", "counter incremented");
    }

    /// Increment the checkpoints-taken counter by one.
    pub fn inc_checkpoints_taken(&self) {
        self.checkpoints_taken.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "checkpoints_taken", "counter incremented");
    }

    /// Increment the sessions-opened counter by one.
    pub fn inc_sessions_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "sessions_opened", "counter incremented");
    }

    /// Increment the commands-executed counter by one.
    pub fn inc_commands_executed(&self) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "commands_executed", "counter incremented");
    }

    /// Add `count` relayed chunks. Relays batch this per event rather than
    /// calling once per byte.
    pub fn add_chunks_relayed(&self, count: u64) {
        self.chunks_relayed.fetch_add(count, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (daemon shutdown, end of a CLI
    /// invocation) rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            tool_calls = self.tool_calls(),
            tool_rejections = self.tool_rejections(),
            tool_failures = self.tool_failures(),
            lifecycle_transitions = self.lifecycle_transitions(),
            checkpoints_taken = self.checkpoints_taken(),
            sessions_opened = self.sessions_opened(),
            commands_executed = self.commands_executed(),
            chunks_relayed = self.chunks_relayed(),
        );
    }

    /// Read the current tool-calls count.
    pub fn tool_calls(&self) -> u64 {
        self.tool_calls.load(Ordering::Relaxed)
    }

    /// Read the current gate-rejections count.
    pub fn tool_rejections(&self) -> u64 {
        self.tool_rejections.load(Ordering::Relaxed)
    }

    /// Read the current handler-failures count.
    pub fn tool_failures(&self) -> u64 {
        self.tool_failures.load(Ordering::Relaxed)
    }

    /// Read the current lifecycle-transitions count.
    pub fn lifecycle_transitions(&self) -> u64 {
        self.lifecycle_transitions.load(Ordering::Relaxed)
    }

    /// Read the current checkpoints-taken count.
    pub fn checkpoints_taken(&self) -> u64 {
        self.checkpoints_taken.load(Ordering::Relaxed)
    }

    /// Read the current sessions-opened count.
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::Relaxed)
    }

    /// Read the current commands-executed count.
    pub fn commands_executed(&self) -> u64 {
        self.commands_executed.load(Ordering::Relaxed)
    }

    /// Read the current relayed-chunks count.
    pub fn chunks_relayed(&self) -> u64 {
        self.chunks_relayed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.tool_calls.store(0, Ordering::Relaxed);
        self.tool_rejections.store(0, Ordering::Relaxed);
        self.tool_failures.store(0, Ordering::Relaxed);
        self.lifecycle_transitions.store(0, Ordering::Relaxed);
        self.checkpoints_taken.store(0, Ordering::Relaxed);
        self.sessions_opened.store(0, Ordering::Relaxed);
        self.commands_executed.store(0, Ordering::Relaxed);
        self.chunks_relayed.store(0, Ordering::Relaxed);
    }
}
