//! Capability gate: fail-closed validation of tool-call arguments.
//!
//! Every tool invocation passes through [`validate`] before its handler may
//! touch the filesystem, process table, or network. Each registered tool
//! declares which of its arguments are workspace paths, shell commands,
//! package names, package managers, or fetch URLs; the gate checks those
//! declarations against one [`GatePolicy`] so adding a tool cannot
//! accidentally skip validation.
//!
//! The gate is pure: it inspects strings and returns either normalized
//! arguments or a rejection. It never reads the filesystem and never panics
//! across the dispatcher boundary.

pub mod engine;
pub mod error;
pub mod policy;
pub mod rules;

pub use engine::validate;
pub use error::GateRejection;
pub use policy::{ArgGuard, GatePolicy, GuardKind};
