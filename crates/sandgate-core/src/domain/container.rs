//! The sandbox container entity and the spec it is created from.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Observable status of the managed sandbox container.
///
/// `Absent` means no container exists under the managed name. The other
/// variants mirror the engine's view of the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    Absent,
    Created,
    Running,
    Stopped,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerStatus::Absent => write!(f, "absent"),
            ContainerStatus::Created => write!(f, "created"),
            ContainerStatus::Running => write!(f, "running"),
            ContainerStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// CPU and memory ceilings applied to the sandbox container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU budget in whole-or-fractional cores.
    pub cpus: f64,
    /// Memory ceiling in bytes.
    pub memory_bytes: i64,
}

impl ResourceLimits {
    /// Engine CPU quota in microseconds per scheduling period.
    ///
    /// Uses the conventional 100ms period, so `cpus = 2.0` yields a quota
    /// of 200_000.
    pub fn cpu_quota(&self) -> i64 {
        (self.cpus * 100_000.0) as i64
    }

    /// The scheduling period matching [`cpu_quota`](Self::cpu_quota).
    pub fn cpu_period(&self) -> i64 {
        100_000
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpus: 2.0,
            memory_bytes: 4 * 1024 * 1024 * 1024,
        }
    }
}

/// Everything needed to create the sandbox container when it is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxSpec {
    /// Logical container name, unique process-wide.
    pub name: String,
    /// Image reference to create from.
    pub image: String,
    /// Container ports published to the host (same port both sides).
    pub ports: Vec<u16>,
    /// Environment variables injected into the container.
    pub env: BTreeMap<String, String>,
    /// CPU/memory ceilings.
    pub limits: ResourceLimits,
}

impl SandboxSpec {
    /// Spec with the given name and image, no ports, no env, default limits.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ports: Vec::new(),
            env: BTreeMap::new(),
            limits: ResourceLimits::default(),
        }
    }

    /// Add a published port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.ports.push(port);
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Override the resource limits.
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Environment rendered as `KEY=VALUE` strings for the engine.
    pub fn env_strings(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

impl Default for SandboxSpec {
    /// The shipped dev-sandbox profile.
    fn default() -> Self {
        Self::new("dev-sandbox", "dev-sandbox:latest")
            .with_port(3000)
            .with_port(8000)
            .with_port(8080)
            .with_env("SANDBOX_MODE", "true")
            .with_env("TOOL_SERVER_ENABLED", "true")
    }
}

/// The single live sandbox container.
///
/// Exactly one of these exists process-wide; it is owned and mutated only by
/// the lifecycle manager. A checkpoint restore discards the entity and
/// replaces it with a new one carrying a new engine id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxContainer {
    /// Engine-assigned opaque id.
    pub id: String,
    /// Logical name the container was created under.
    pub name: String,
    /// Current status as last observed.
    pub status: ContainerStatus,
    /// Limits the container was created with.
    pub limits: ResourceLimits,
    /// Ports the container publishes.
    pub ports: Vec<u16>,
}

impl SandboxContainer {
    /// Construct from a spec and the id the engine assigned.
    pub fn from_spec(id: impl Into<String>, spec: &SandboxSpec, status: ContainerStatus) -> Self {
        Self {
            id: id.into(),
            name: spec.name.clone(),
            status,
            limits: spec.limits,
            ports: spec.ports.clone(),
        }
    }

    /// Whether the container is currently running.
    pub fn is_running(&self) -> bool {
        self.status == ContainerStatus::Running
    }
}
