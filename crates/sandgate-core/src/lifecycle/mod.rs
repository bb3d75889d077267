//! Sandbox container lifecycle: the single owner of container state.
//!
//! The [`LifecycleManager`] serializes every transition
//! (create/start/stop/remove/checkpoint/restore) behind one lock, so the
//! state machine can never race itself. The container engine sits behind the
//! [`EngineClient`] trait: production uses [`DockerEngine`] over the local
//! socket, tests use [`crate::fakes::StubEngine`].
//!
//! State machine:
//!
//! ```text
//! absent --create--> created --start--> running --stop--> stopped --start--> running
//! stopped|running --remove--> absent
//! running|stopped --commit--> (unchanged) + new Checkpoint
//! * --restore(checkpoint)--> running   (prior container stopped and removed)
//! ```

pub mod docker;
pub mod engine;
pub mod error;
pub mod manager;

pub use docker::DockerEngine;
pub use engine::{
    EngineClient, EngineContainer, EngineContainerState, ExecHandle, ExitFuture, ImageRecord,
    OutputStream,
};
pub use error::{LifecycleError, LifecycleResult};
pub use manager::LifecycleManager;
