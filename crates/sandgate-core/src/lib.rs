//! Sandgate Core Library
//!
//! Re-exports the capability gate, tool dispatcher, container lifecycle,
//! streaming sessions, and the control-plane façade that ties them together.

pub mod auth;
pub mod config;
pub mod control;
pub mod domain;
pub mod fakes;
pub mod gate;
pub mod lifecycle;
pub mod manifest;
pub mod metrics;
pub mod obs;
pub mod streaming;
pub mod telemetry;
pub mod tools;

pub use auth::{AuthError, Credential, CredentialAuthority, JwtAuthority};

pub use config::ControlConfig;

pub use control::{ControlError, ControlPlane, ControlResult, StatusReport, ToolServerRecord};

pub use domain::{
    Checkpoint, ContainerStatus, ResourceLimits, SandboxContainer, SandboxSpec,
};

pub use gate::{validate, ArgGuard, GatePolicy, GateRejection, GuardKind};

pub use lifecycle::{
    DockerEngine, EngineClient, EngineContainer, EngineContainerState, ExecHandle, ExitFuture,
    ImageRecord, LifecycleError, LifecycleManager, LifecycleResult, OutputStream,
};

pub use manifest::{ManifestEntry, ManifestError, ToolManifest};

pub use streaming::{
    ErrorScope, SessionEvent, SessionHandle, SessionManager, StreamingError, StreamingResult,
};

pub use tools::{
    builtin_registry, CommandOutput, DirEntryInfo, FetchedPage, ToolCall, ToolError, ToolHost,
    ToolRegistry, ToolResult, ToolSpec,
};

pub use metrics::METRICS;
pub use obs::{
    emit_command_completed, emit_command_started, emit_gate_rejected, emit_session_closed,
    emit_session_opened, emit_subscription_started, emit_tool_invoked, SessionSpan,
};
pub use telemetry::init_tracing;

/// Sandgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
