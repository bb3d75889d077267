//! Serialized lifecycle driver for a single named sandbox.

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::{Checkpoint, ContainerStatus, SandboxContainer, SandboxSpec};

use super::engine::{EngineClient, EngineContainer, EngineContainerState};
use super::error::{LifecycleError, LifecycleResult};

/// Drives one sandbox container through absent, created, running and
/// stopped. All transitions run under a single lock, so concurrent callers
/// observe them in some serial order and never interleave engine calls.
pub struct LifecycleManager<E> {
    engine: E,
    name: String,
    inner: Mutex<State>,
}

#[derive(Default)]
struct State {
    container: Option<SandboxContainer>,
    checkpoints: Vec<Checkpoint>,
}

fn status_from(state: EngineContainerState) -> ContainerStatus {
    match state {
        EngineContainerState::Created => ContainerStatus::Created,
        EngineContainerState::Running => ContainerStatus::Running,
        EngineContainerState::Stopped => ContainerStatus::Stopped,
    }
}

/// Derives an image tag from a checkpoint label. Engine tags only accept
/// `[A-Za-z0-9._-]` with an alphanumeric or underscore first character.
fn image_tag(label: &str) -> String {
    let mut tag: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .take(64)
        .collect();
    let leading_ok = tag
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    if !leading_ok {
        tag.insert(0, 'c');
    }
    tag
}

impl<E: EngineClient> LifecycleManager<E> {
    pub fn new(engine: E, name: impl Into<String>) -> Self {
        Self {
            engine,
            name: name.into(),
            inner: Mutex::new(State::default()),
        }
    }

    /// Name of the sandbox this manager owns.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Last container record this manager produced, if any.
    pub async fn current(&self) -> Option<SandboxContainer> {
        self.inner.lock().await.container.clone()
    }

    /// Checkpoints for this sandbox, rebuilt from the engine's image listing
    /// so they survive control-plane restarts, oldest first. Source container
    /// ids are filled in for commits taken through this manager; checkpoints
    /// found only in the engine have none.
    pub async fn list_checkpoints(&self) -> LifecycleResult<Vec<Checkpoint>> {
        let state = self.inner.lock().await;
        let repository = Checkpoint::repository_for(&self.name);
        let prefix = format!("{repository}:");

        let mut checkpoints = Vec::new();
        for image in self.engine.list_images(&repository).await? {
            for label in image.tags.iter().filter_map(|t| t.strip_prefix(&prefix)) {
                let source_container_id = state
                    .checkpoints
                    .iter()
                    .find(|c| c.id == image.id)
                    .and_then(|c| c.source_container_id.clone());
                checkpoints.push(Checkpoint {
                    id: image.id.clone(),
                    label: label.to_string(),
                    created_at: image.created_at,
                    source_container_id,
                });
            }
        }
        checkpoints.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.label.cmp(&b.label))
        });
        Ok(checkpoints)
    }

    /// Checkpoint whose listed label matches `label`, either verbatim or
    /// after tag sanitizing.
    pub async fn find_checkpoint(&self, label: &str) -> LifecycleResult<Option<Checkpoint>> {
        let tag = image_tag(label);
        Ok(self
            .list_checkpoints()
            .await?
            .into_iter()
            .find(|c| c.label == label || c.label == tag))
    }

    /// Brings the sandbox to running, creating the container first when the
    /// engine has none under this name. Calling it on an already running
    /// sandbox changes nothing and returns the same container.
    pub async fn ensure_running(&self, spec: &SandboxSpec) -> LifecycleResult<SandboxContainer> {
        self.check_spec(spec)?;
        let mut state = self.inner.lock().await;

        let observed = self.observe(state.container.as_ref()).await?;
        let container = match observed {
            Some(found) if found.state == EngineContainerState::Running => {
                debug!(container_id = %found.id, "sandbox already running");
                SandboxContainer::from_spec(found.id, spec, ContainerStatus::Running)
            }
            Some(found) => {
                self.engine.start(&found.id).await?;
                info!(container_id = %found.id, "started existing sandbox container");
                SandboxContainer::from_spec(found.id, spec, ContainerStatus::Running)
            }
            None => {
                let id = self.engine.create_container(spec).await?;
                self.engine.start(&id).await?;
                info!(container_id = %id, image = %spec.image, "created sandbox container");
                SandboxContainer::from_spec(id, spec, ContainerStatus::Running)
            }
        };

        state.container = Some(container.clone());
        Ok(container)
    }

    /// Stops the container if it is running. Absent and already stopped
    /// sandboxes are left as they are.
    pub async fn stop(&self) -> LifecycleResult<ContainerStatus> {
        let mut state = self.inner.lock().await;

        let observed = self.observe(state.container.as_ref()).await?;
        let status = match observed {
            Some(found) if found.state == EngineContainerState::Running => {
                match self.engine.stop(&found.id).await {
                    Ok(()) | Err(LifecycleError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
                info!(container_id = %found.id, "stopped sandbox container");
                ContainerStatus::Stopped
            }
            Some(found) => status_from(found.state),
            None => ContainerStatus::Absent,
        };

        if let Some(container) = state.container.as_mut() {
            container.status = status;
        }
        Ok(status)
    }

    /// Removes the container entirely. A sandbox that is already absent is
    /// not an error.
    pub async fn remove(&self) -> LifecycleResult<()> {
        let mut state = self.inner.lock().await;

        if let Some(found) = self.observe(state.container.as_ref()).await? {
            match self.engine.remove(&found.id, true).await {
                Ok(()) | Err(LifecycleError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
            info!(container_id = %found.id, "removed sandbox container");
        }

        state.container = None;
        Ok(())
    }

    /// Captures the container filesystem as an image and records it under
    /// `label`. Re-using a label replaces the earlier checkpoint.
    pub async fn checkpoint(&self, label: &str) -> LifecycleResult<Checkpoint> {
        let mut state = self.inner.lock().await;

        let found = self
            .observe(state.container.as_ref())
            .await?
            .ok_or_else(|| LifecycleError::Conflict("no sandbox container to checkpoint".into()))?;

        let repository = Checkpoint::repository_for(&self.name);
        let image_id = self
            .engine
            .commit(&found.id, &repository, &image_tag(label))
            .await?;
        info!(container_id = %found.id, image_id = %image_id, label, "checkpointed sandbox");

        let checkpoint = Checkpoint::new(image_id, label, found.id);

        state.checkpoints.retain(|c| c.label != label);
        state.checkpoints.push(checkpoint.clone());
        Ok(checkpoint)
    }

    /// Replaces the container with a fresh one booted from the checkpoint
    /// image. The replacement always has a new container id.
    pub async fn restore_from(
        &self,
        checkpoint: &Checkpoint,
        spec: &SandboxSpec,
    ) -> LifecycleResult<SandboxContainer> {
        self.check_spec(spec)?;
        let mut state = self.inner.lock().await;

        if let Some(found) = self.observe(state.container.as_ref()).await? {
            if found.state == EngineContainerState::Running {
                match self.engine.stop(&found.id).await {
                    Ok(()) | Err(LifecycleError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            match self.engine.remove(&found.id, true).await {
                Ok(()) | Err(LifecycleError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        state.container = None;

        let mut restored_spec = spec.clone();
        restored_spec.image = checkpoint.id.clone();

        let id = self.engine.create_container(&restored_spec).await?;
        self.engine.start(&id).await?;
        info!(
            container_id = %id,
            checkpoint = %checkpoint.label,
            image_id = %checkpoint.id,
            "restored sandbox from checkpoint"
        );

        let record = SandboxContainer::from_spec(id, &restored_spec, ContainerStatus::Running);
        state.container = Some(record.clone());
        Ok(record)
    }

    /// Re-reads the engine and reports where the sandbox currently is.
    pub async fn status(&self) -> LifecycleResult<ContainerStatus> {
        let mut state = self.inner.lock().await;

        let observed = self.observe(state.container.as_ref()).await?;
        let status = match observed {
            Some(found) => {
                let status = status_from(found.state);
                if let Some(container) = state.container.as_mut() {
                    container.id = found.id;
                    container.status = status;
                }
                status
            }
            None => {
                state.container = None;
                ContainerStatus::Absent
            }
        };
        Ok(status)
    }

    fn check_spec(&self, spec: &SandboxSpec) -> LifecycleResult<()> {
        if spec.name.is_empty() {
            return Err(LifecycleError::InvalidSpec("sandbox name is empty".into()));
        }
        if spec.image.is_empty() {
            return Err(LifecycleError::InvalidSpec("sandbox image is empty".into()));
        }
        if spec.name != self.name {
            return Err(LifecycleError::InvalidSpec(format!(
                "spec names sandbox {} but this manager owns {}",
                spec.name, self.name
            )));
        }
        Ok(())
    }

    /// Looks the sandbox up in the engine, by held id first and by name as
    /// fallback. Returns what the engine sees right now.
    async fn observe(
        &self,
        held: Option<&SandboxContainer>,
    ) -> LifecycleResult<Option<EngineContainer>> {
        if let Some(container) = held {
            if let Some(found) = self.engine.inspect(&container.id).await? {
                return Ok(Some(found));
            }
        }
        let containers = self.engine.list_containers(true).await?;
        Ok(containers.into_iter().find(|c| c.name == self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_tag_passes_clean_labels_through() {
        assert_eq!(image_tag("before-refactor"), "before-refactor");
        assert_eq!(image_tag("v1.2_final"), "v1.2_final");
    }

    #[test]
    fn image_tag_replaces_forbidden_characters() {
        assert_eq!(image_tag("before refactor!"), "before-refactor-");
    }

    #[test]
    fn image_tag_never_starts_with_separator() {
        assert_eq!(image_tag("-draft"), "c-draft");
        assert_eq!(image_tag(""), "c");
    }

    #[test]
    fn image_tag_truncates_long_labels() {
        let long = "x".repeat(200);
        assert_eq!(image_tag(&long).len(), 64);
    }
}
