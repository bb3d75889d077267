//! Domain models for Sandgate.
//!
//! Canonical definitions for the core entities:
//! - `SandboxContainer`: The single live sandbox and its status
//! - `SandboxSpec`: What to create when the sandbox is absent
//! - `Checkpoint`: An immutable filesystem snapshot taken via image commit

pub mod checkpoint;
pub mod container;

// Re-export main types
pub use checkpoint::Checkpoint;
pub use container::{ContainerStatus, ResourceLimits, SandboxContainer, SandboxSpec};
