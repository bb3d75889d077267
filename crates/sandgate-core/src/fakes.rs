//! In-memory fakes for the engine and credential seams (testing only)
//!
//! Provides `StubEngine` and `StaticAuthority` that satisfy the trait
//! contracts without a container daemon or a signing key.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::channel::mpsc::UnboundedSender;
use futures::StreamExt;

use crate::auth::{AuthError, Credential, CredentialAuthority, CREDENTIAL_TTL_SECS};
use crate::domain::SandboxSpec;
use crate::lifecycle::{
    EngineClient, EngineContainer, EngineContainerState, ExecHandle, ImageRecord, LifecycleError,
    LifecycleResult, OutputStream,
};

// ---------------------------------------------------------------------------
// StubEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StubContainer {
    id: String,
    name: String,
    image: String,
    state: EngineContainerState,
    files: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct EngineState {
    containers: HashMap<String, StubContainer>,
    images: HashMap<String, ImageRecord>,
    image_files: HashMap<String, BTreeMap<String, String>>,
    scripted_execs: VecDeque<(Vec<String>, i64)>,
    executed: Vec<Vec<String>>,
    watchers: HashMap<String, Vec<UnboundedSender<String>>>,
    unavailable: bool,
}

/// In-memory container engine. Containers hold a flat file map so commit
/// and restore round-trips are observable without a real daemon.
#[derive(Debug, Default)]
pub struct StubEngine {
    state: Mutex<EngineState>,
    next_id: AtomicU64,
}

fn guard(state: &EngineState) -> LifecycleResult<()> {
    if state.unavailable {
        return Err(LifecycleError::EngineUnavailable("stub engine offline".into()));
    }
    Ok(())
}

fn to_engine_container(container: &StubContainer) -> EngineContainer {
    EngineContainer {
        id: container.id.clone(),
        name: container.name.clone(),
        image: container.image.clone(),
        state: container.state,
    }
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the engine offline; every call fails with `EngineUnavailable`
    /// until flipped back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Register an image so specs can reference it before any commit.
    pub fn seed_image(&self, id: &str, reference: &str) {
        let mut state = self.state.lock().unwrap();
        state.images.insert(
            id.to_string(),
            ImageRecord {
                id: id.to_string(),
                tags: vec![reference.to_string()],
                created_at: Utc::now(),
            },
        );
        state.image_files.insert(id.to_string(), BTreeMap::new());
    }

    /// Write a file inside a container, as a tool run would.
    pub fn write_file(&self, container_id: &str, path: &str, contents: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(container) = state.containers.get_mut(container_id) {
            container.files.insert(path.to_string(), contents.to_string());
        }
    }

    pub fn read_file(&self, container_id: &str, path: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .get(container_id)
            .and_then(|c| c.files.get(path).cloned())
    }

    /// Emit a line on the container output stream, as the engine would.
    pub fn push_output(&self, container_id: &str, line: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(watchers) = state.watchers.get_mut(container_id) {
            watchers.retain(|tx| tx.unbounded_send(line.to_string()).is_ok());
        }
    }

    /// Live attachments on a container, after pruning closed ones.
    pub fn watcher_count(&self, container_id: &str) -> usize {
        let mut state = self.state.lock().unwrap();
        if let Some(watchers) = state.watchers.get_mut(container_id) {
            watchers.retain(|tx| !tx.is_closed());
            watchers.len()
        } else {
            0
        }
    }

    /// Script the outcome of the next `exec` call.
    pub fn queue_exec(&self, lines: &[&str], exit_code: i64) {
        let mut state = self.state.lock().unwrap();
        let lines = lines.iter().map(|l| l.to_string()).collect();
        state.scripted_execs.push_back((lines, exit_code));
    }

    /// Argv of every `exec` call so far, in order.
    pub fn executed(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().executed.clone()
    }

    /// Id of the container registered under `name`, if any.
    pub fn container_id(&self, name: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .values()
            .find(|c| c.name == name)
            .map(|c| c.id.clone())
    }

    fn next(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{n:04}")
    }
}

#[async_trait]
impl EngineClient for StubEngine {
    async fn list_containers(&self, all: bool) -> LifecycleResult<Vec<EngineContainer>> {
        let state = self.state.lock().unwrap();
        guard(&state)?;
        Ok(state
            .containers
            .values()
            .filter(|c| all || c.state == EngineContainerState::Running)
            .map(to_engine_container)
            .collect())
    }

    async fn create_container(&self, spec: &SandboxSpec) -> LifecycleResult<String> {
        let mut state = self.state.lock().unwrap();
        guard(&state)?;
        if spec.name.is_empty() || spec.image.is_empty() {
            return Err(LifecycleError::InvalidSpec(
                "name and image must be non-empty".into(),
            ));
        }
        if state.containers.values().any(|c| c.name == spec.name) {
            return Err(LifecycleError::Conflict(format!(
                "container name {} already in use",
                spec.name
            )));
        }

        let id = self.next("container");
        let files = state.image_files.get(&spec.image).cloned().unwrap_or_default();
        state.containers.insert(
            id.clone(),
            StubContainer {
                id: id.clone(),
                name: spec.name.clone(),
                image: spec.image.clone(),
                state: EngineContainerState::Created,
                files,
            },
        );
        Ok(id)
    }

    async fn start(&self, id: &str) -> LifecycleResult<()> {
        let mut state = self.state.lock().unwrap();
        guard(&state)?;
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| LifecycleError::NotFound(format!("no container {id}")))?;
        container.state = EngineContainerState::Running;
        Ok(())
    }

    async fn stop(&self, id: &str) -> LifecycleResult<()> {
        let mut state = self.state.lock().unwrap();
        guard(&state)?;
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| LifecycleError::NotFound(format!("no container {id}")))?;
        container.state = EngineContainerState::Stopped;
        Ok(())
    }

    async fn remove(&self, id: &str, force: bool) -> LifecycleResult<()> {
        let mut state = self.state.lock().unwrap();
        guard(&state)?;
        let container = state
            .containers
            .get(id)
            .ok_or_else(|| LifecycleError::NotFound(format!("no container {id}")))?;
        if container.state == EngineContainerState::Running && !force {
            return Err(LifecycleError::Conflict(format!(
                "container {id} is running"
            )));
        }
        state.containers.remove(id);
        state.watchers.remove(id);
        Ok(())
    }

    async fn commit(&self, id: &str, repository: &str, tag: &str) -> LifecycleResult<String> {
        let mut state = self.state.lock().unwrap();
        guard(&state)?;
        let files = state
            .containers
            .get(id)
            .map(|c| c.files.clone())
            .ok_or_else(|| LifecycleError::NotFound(format!("no container {id}")))?;

        let reference = format!("{repository}:{tag}");
        for image in state.images.values_mut() {
            image.tags.retain(|t| t != &reference);
        }

        let image_id = self.next("sha256:stub");
        state.images.insert(
            image_id.clone(),
            ImageRecord {
                id: image_id.clone(),
                tags: vec![reference],
                created_at: Utc::now(),
            },
        );
        state.image_files.insert(image_id.clone(), files);
        Ok(image_id)
    }

    async fn attach(&self, id: &str) -> LifecycleResult<OutputStream> {
        let mut state = self.state.lock().unwrap();
        guard(&state)?;
        if !state.containers.contains_key(id) {
            return Err(LifecycleError::NotFound(format!("no container {id}")));
        }
        let (tx, rx) = futures::channel::mpsc::unbounded();
        state.watchers.entry(id.to_string()).or_default().push(tx);
        Ok(rx.boxed())
    }

    async fn exec(&self, id: &str, argv: Vec<String>) -> LifecycleResult<ExecHandle> {
        let mut state = self.state.lock().unwrap();
        guard(&state)?;
        if !state.containers.contains_key(id) {
            return Err(LifecycleError::NotFound(format!("no container {id}")));
        }
        state.executed.push(argv);
        let (lines, exit_code) = state.scripted_execs.pop_front().unwrap_or((Vec::new(), 0));

        Ok(ExecHandle {
            output: futures::stream::iter(lines).boxed(),
            exit_code: Box::pin(async move { Ok(exit_code) }),
        })
    }

    async fn list_images(&self, repository: &str) -> LifecycleResult<Vec<ImageRecord>> {
        let state = self.state.lock().unwrap();
        guard(&state)?;
        let prefix = format!("{repository}:");
        Ok(state
            .images
            .values()
            .filter(|image| image.tags.iter().any(|t| t.starts_with(&prefix)))
            .cloned()
            .collect())
    }

    async fn inspect(&self, id: &str) -> LifecycleResult<Option<EngineContainer>> {
        let state = self.state.lock().unwrap();
        guard(&state)?;
        Ok(state.containers.get(id).map(to_engine_container))
    }
}

// ---------------------------------------------------------------------------
// StaticAuthority
// ---------------------------------------------------------------------------

/// Credential authority with a pre-registered token table and no signing.
#[derive(Debug, Default)]
pub struct StaticAuthority {
    issued: Mutex<HashMap<String, Credential>>,
}

impl StaticAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register a token so `verify` accepts it.
    pub fn accept(&self, token: &str, subject: &str) {
        let issued_at = Utc::now();
        let credential = Credential {
            subject: subject.to_string(),
            issued_at,
            expires_at: issued_at + Duration::seconds(CREDENTIAL_TTL_SECS),
        };
        self.issued
            .lock()
            .unwrap()
            .insert(token.to_string(), credential);
    }
}

impl CredentialAuthority for StaticAuthority {
    fn issue(&self, subject: &str) -> Result<String, AuthError> {
        let token = format!("static-{subject}");
        self.accept(&token, subject);
        Ok(token)
    }

    fn verify(&self, token: &str) -> Result<Credential, AuthError> {
        self.issued
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::Invalid("token not issued by this authority".into()))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
