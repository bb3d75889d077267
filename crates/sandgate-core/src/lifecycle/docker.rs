//! Docker implementation of [`EngineClient`] over bollard.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, Config, CreateContainerOptions, InspectContainerOptions,
    ListContainersOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{CommitContainerOptions, ListImagesOptions};
use bollard::models::{
    ContainerStateStatusEnum, ContainerSummary, HostConfig, PortBinding, RestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::Docker;
use chrono::DateTime;
use futures::StreamExt;
use tracing::warn;

use crate::domain::SandboxSpec;

use super::engine::{
    EngineClient, EngineContainer, EngineContainerState, ExecHandle, ExitFuture, ImageRecord,
    OutputStream,
};
use super::error::{LifecycleError, LifecycleResult};

/// Seconds a graceful stop waits before the engine kills the container.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Production engine client talking to the local Docker daemon.
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to the daemon, over the given socket path or the platform
    /// defaults when none is configured.
    pub fn connect(socket: Option<&str>) -> LifecycleResult<Self> {
        let docker = match socket {
            Some(path) => Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| LifecycleError::EngineUnavailable(e.to_string()))?;

        Ok(Self { docker })
    }
}

fn map_engine_error(err: bollard::errors::Error) -> LifecycleError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => match status_code {
            404 => LifecycleError::NotFound(message),
            409 => LifecycleError::Conflict(message),
            400 => LifecycleError::InvalidSpec(message),
            _ => LifecycleError::EngineUnavailable(format!("engine error {status_code}: {message}")),
        },
        other => LifecycleError::EngineUnavailable(other.to_string()),
    }
}

fn summary_to_container(summary: ContainerSummary) -> Option<EngineContainer> {
    let id = summary.id?;
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_default();
    let state = match summary.state.as_deref() {
        Some("running") => EngineContainerState::Running,
        Some("created") => EngineContainerState::Created,
        _ => EngineContainerState::Stopped,
    };

    Some(EngineContainer {
        id,
        name,
        image: summary.image.unwrap_or_default(),
        state,
    })
}

fn chunk_stream(
    raw: impl futures::Stream<Item = Result<bollard::container::LogOutput, bollard::errors::Error>>
        + Send
        + 'static,
) -> OutputStream {
    raw.filter_map(|item| async move {
        match item {
            Ok(chunk) => Some(String::from_utf8_lossy(&chunk.into_bytes()).into_owned()),
            Err(e) => {
                warn!(error = %e, "engine output stream error");
                None
            }
        }
    })
    .boxed()
}

#[async_trait]
impl EngineClient for DockerEngine {
    async fn list_containers(&self, all: bool) -> LifecycleResult<Vec<EngineContainer>> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(map_engine_error)?;

        Ok(summaries.into_iter().filter_map(summary_to_container).collect())
    }

    async fn create_container(&self, spec: &SandboxSpec) -> LifecycleResult<String> {
        if spec.name.is_empty() || spec.image.is_empty() {
            return Err(LifecycleError::InvalidSpec(
                "name and image must be non-empty".into(),
            ));
        }

        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .ports
            .iter()
            .map(|port| (format!("{port}/tcp"), HashMap::new()))
            .collect();
        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
            .ports
            .iter()
            .map(|port| {
                (
                    format!("{port}/tcp"),
                    Some(vec![PortBinding {
                        host_ip: None,
                        host_port: Some(port.to_string()),
                    }]),
                )
            })
            .collect();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            memory: Some(spec.limits.memory_bytes),
            cpu_quota: Some(spec.limits.cpu_quota()),
            cpu_period: Some(spec.limits.cpu_period()),
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                maximum_retry_count: None,
            }),
            ..Default::default()
        };
        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env_strings()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(map_engine_error)?;

        Ok(created.id)
    }

    async fn start(&self, id: &str) -> LifecycleResult<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_engine_error)
    }

    async fn stop(&self, id: &str) -> LifecycleResult<()> {
        match self
            .docker
            .stop_container(id, Some(StopContainerOptions { t: STOP_TIMEOUT_SECS }))
            .await
        {
            Ok(()) => Ok(()),
            // 304: already stopped.
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(map_engine_error(e)),
        }
    }

    async fn remove(&self, id: &str, force: bool) -> LifecycleResult<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(map_engine_error)
    }

    async fn commit(&self, id: &str, repository: &str, tag: &str) -> LifecycleResult<String> {
        let options = CommitContainerOptions {
            container: id.to_string(),
            repo: repository.to_string(),
            tag: tag.to_string(),
            pause: true,
            ..Default::default()
        };
        let commit = self
            .docker
            .commit_container(options, Config::<String>::default())
            .await
            .map_err(map_engine_error)?;

        if let Some(image_id) = commit.id {
            return Ok(image_id);
        }

        // Some daemon versions omit the id in the commit response; recover it
        // from the listing of the reference we just tagged.
        let reference = format!("{repository}:{tag}");
        let images = self.list_images(repository).await?;
        images
            .into_iter()
            .find(|image| image.tags.iter().any(|t| t == &reference))
            .map(|image| image.id)
            .ok_or_else(|| LifecycleError::NotFound(format!("committed image {reference} not visible")))
    }

    async fn attach(&self, id: &str) -> LifecycleResult<OutputStream> {
        let options = AttachContainerOptions::<String> {
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            ..Default::default()
        };
        let results = self
            .docker
            .attach_container(id, Some(options))
            .await
            .map_err(map_engine_error)?;

        Ok(chunk_stream(results.output))
    }

    async fn exec(&self, id: &str, argv: Vec<String>) -> LifecycleResult<ExecHandle> {
        let created = self
            .docker
            .create_exec(
                id,
                CreateExecOptions::<String> {
                    cmd: Some(argv),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(map_engine_error)?;
        let exec_id = created.id;

        let started = self
            .docker
            .start_exec(&exec_id, None)
            .await
            .map_err(map_engine_error)?;
        let output = match started {
            StartExecResults::Attached { output, .. } => chunk_stream(output),
            StartExecResults::Detached => futures::stream::empty().boxed(),
        };

        let docker = self.docker.clone();
        let exit_code: ExitFuture = Box::pin(async move {
            let inspect = docker
                .inspect_exec(&exec_id)
                .await
                .map_err(map_engine_error)?;
            Ok(inspect.exit_code.unwrap_or(-1))
        });

        Ok(ExecHandle { output, exit_code })
    }

    async fn list_images(&self, repository: &str) -> LifecycleResult<Vec<ImageRecord>> {
        let mut filters = HashMap::new();
        filters.insert("reference".to_string(), vec![repository.to_string()]);
        let options = ListImagesOptions::<String> {
            filters,
            ..Default::default()
        };

        let images = self
            .docker
            .list_images(Some(options))
            .await
            .map_err(map_engine_error)?;

        Ok(images
            .into_iter()
            .map(|image| ImageRecord {
                id: image.id,
                tags: image.repo_tags,
                created_at: DateTime::from_timestamp(image.created, 0).unwrap_or_default(),
            })
            .collect())
    }

    async fn inspect(&self, id: &str) -> LifecycleResult<Option<EngineContainer>> {
        let details = match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => details,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Ok(None),
            Err(e) => return Err(map_engine_error(e)),
        };

        let state = details
            .state
            .as_ref()
            .and_then(|s| s.status)
            .map(|status| match status {
                ContainerStateStatusEnum::RUNNING => EngineContainerState::Running,
                ContainerStateStatusEnum::CREATED => EngineContainerState::Created,
                _ => EngineContainerState::Stopped,
            })
            .unwrap_or(EngineContainerState::Stopped);

        Ok(Some(EngineContainer {
            id: details.id.unwrap_or_else(|| id.to_string()),
            name: details
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            image: details.config.and_then(|c| c.image).unwrap_or_default(),
            state,
        }))
    }
}
