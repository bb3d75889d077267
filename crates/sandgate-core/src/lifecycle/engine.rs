//! The container-engine seam.
//!
//! Everything the control plane needs from an engine is expressed here, so
//! the lifecycle manager, the streaming layer, and the tests all talk to the
//! same narrow trait instead of a concrete client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::domain::SandboxSpec;

use super::error::LifecycleResult;

/// Combined stdout/stderr chunks from an attach or exec, in arrival order.
pub type OutputStream = BoxStream<'static, String>;

/// Resolves to the process exit code once an exec finishes. Await it only
/// after draining the output stream.
pub type ExitFuture = BoxFuture<'static, LifecycleResult<i64>>;

/// Engine-side view of a container's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineContainerState {
    Created,
    Running,
    Stopped,
}

/// A container as the engine reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: EngineContainerState,
}

/// An image as the engine reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    /// `repository:tag` references pointing at this image.
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A started one-shot execution inside a container.
pub struct ExecHandle {
    /// Incremental output, drained to completion.
    pub output: OutputStream,
    /// The exit code, available once the process finishes.
    pub exit_code: ExitFuture,
}

/// Narrow async client for the container engine.
///
/// Every operation may fail with `EngineUnavailable` (transport) or
/// `NotFound` (missing container/image); implementations map their native
/// errors onto [`super::LifecycleError`] and never panic.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Containers known to the engine; `all` includes stopped ones.
    async fn list_containers(&self, all: bool) -> LifecycleResult<Vec<EngineContainer>>;

    /// Create a container from the spec. Returns the engine-assigned id.
    async fn create_container(&self, spec: &SandboxSpec) -> LifecycleResult<String>;

    /// Start a created or stopped container.
    async fn start(&self, id: &str) -> LifecycleResult<()>;

    /// Stop a running container.
    async fn stop(&self, id: &str) -> LifecycleResult<()>;

    /// Remove a container; `force` removes it even while running.
    async fn remove(&self, id: &str, force: bool) -> LifecycleResult<()>;

    /// Commit the container filesystem into an image tagged
    /// `repository:tag`. Returns the new image id.
    async fn commit(&self, id: &str, repository: &str, tag: &str) -> LifecycleResult<String>;

    /// Attach to the container's combined stdout/stderr.
    async fn attach(&self, id: &str) -> LifecycleResult<OutputStream>;

    /// Start a one-shot execution of `argv` inside the container.
    async fn exec(&self, id: &str, argv: Vec<String>) -> LifecycleResult<ExecHandle>;

    /// Images whose references live under `repository`.
    async fn list_images(&self, repository: &str) -> LifecycleResult<Vec<ImageRecord>>;

    /// Engine view of one container, `None` if it does not exist.
    async fn inspect(&self, id: &str) -> LifecycleResult<Option<EngineContainer>>;
}
