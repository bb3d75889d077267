//! Control-plane façade composing the gate, dispatcher, lifecycle and
//! streaming layers behind one surface.
//!
//! The HTTP routes and CLI subcommands are thin wrappers over this type;
//! nothing here parses requests or formats responses.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::auth::{Credential, CredentialAuthority, JwtAuthority};
use crate::config::ControlConfig;
use crate::domain::{Checkpoint, ContainerStatus, SandboxContainer, SandboxSpec};
use crate::gate::{self, ArgGuard, GuardKind};
use crate::lifecycle::{EngineClient, LifecycleError, LifecycleManager};
use crate::manifest::{ManifestError, ToolManifest};
use crate::metrics::METRICS;
use crate::streaming::SessionManager;
use crate::tools::{builtin_registry, ToolCall, ToolHost, ToolRegistry, ToolResult, ToolSpec};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("tool-server install failed: {0}")]
    InstallFailed(String),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

pub type ControlResult<T> = Result<T, ControlError>;

/// Point-in-time summary of the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub sandbox: String,
    pub status: ContainerStatus,
    pub container_id: Option<String>,
    pub checkpoints: usize,
    pub tools: usize,
    pub active_sessions: usize,
}

/// An external tool server registered with the sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolServerRecord {
    pub name: String,
    pub url: String,
    pub installed_at: DateTime<Utc>,
}

/// The surface clients actually call.
pub struct ControlPlane<E: EngineClient> {
    config: ControlConfig,
    lifecycle: Arc<LifecycleManager<E>>,
    sessions: Arc<SessionManager<E>>,
    registry: Arc<ToolRegistry>,
    authority: Arc<dyn CredentialAuthority>,
    tool_servers: Mutex<BTreeMap<String, ToolServerRecord>>,
}

impl<E: EngineClient> ControlPlane<E> {
    /// Wire every layer up from configuration and an engine client.
    pub fn bootstrap(config: ControlConfig, engine: E) -> Self {
        let policy = gate::GatePolicy::rooted_at(&config.workspace_root);
        let host = Arc::new(ToolHost::new(&config.workspace_root));
        let registry = Arc::new(builtin_registry(policy, host));
        let authority: Arc<dyn CredentialAuthority> =
            Arc::new(JwtAuthority::new(config.credential_secret.clone()));
        let lifecycle = Arc::new(LifecycleManager::new(engine, config.sandbox_name.clone()));
        let sessions = Arc::new(SessionManager::new(lifecycle.clone(), authority.clone()));

        Self {
            config,
            lifecycle,
            sessions,
            registry,
            authority,
            tool_servers: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager<E>> {
        &self.lifecycle
    }

    pub fn sessions(&self) -> &Arc<SessionManager<E>> {
        &self.sessions
    }

    pub fn tools(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    /// The sandbox spec the configuration describes.
    pub fn sandbox_spec(&self) -> SandboxSpec {
        SandboxSpec {
            name: self.config.sandbox_name.clone(),
            image: self.config.sandbox_image.clone(),
            ..SandboxSpec::default()
        }
    }

    /// Exchange the shared secret for a bearer token.
    pub fn login(&self, subject: &str, secret: &str) -> ControlResult<String> {
        if secret != self.config.credential_secret {
            return Err(ControlError::Unauthorized("wrong secret".into()));
        }
        self.authority
            .issue(subject)
            .map_err(|e| ControlError::Unauthorized(e.to_string()))
    }

    /// Check a bearer token and return the credential it carries.
    pub fn verify_token(&self, token: &str) -> ControlResult<Credential> {
        self.authority
            .verify(token)
            .map_err(|e| ControlError::Unauthorized(e.to_string()))
    }

    pub async fn status(&self) -> ControlResult<StatusReport> {
        let status = self.lifecycle.status().await?;
        let container = self.lifecycle.current().await;
        Ok(StatusReport {
            version: crate::VERSION.to_string(),
            timestamp: Utc::now(),
            sandbox: self.lifecycle.name().to_string(),
            status,
            container_id: container.map(|c| c.id),
            checkpoints: self.lifecycle.list_checkpoints().await?.len(),
            tools: self.registry.specs().len(),
            active_sessions: self.sessions.session_count().await,
        })
    }

    pub async fn start_sandbox(&self) -> ControlResult<SandboxContainer> {
        let container = self.lifecycle.ensure_running(&self.sandbox_spec()).await?;
        METRICS.inc_lifecycle_transitions();
        Ok(container)
    }

    pub async fn stop_sandbox(&self) -> ControlResult<ContainerStatus> {
        let status = self.lifecycle.stop().await?;
        METRICS.inc_lifecycle_transitions();
        Ok(status)
    }

    pub async fn remove_sandbox(&self) -> ControlResult<()> {
        self.lifecycle.remove().await?;
        METRICS.inc_lifecycle_transitions();
        Ok(())
    }

    pub async fn checkpoint(&self, label: &str) -> ControlResult<Checkpoint> {
        let checkpoint = self.lifecycle.checkpoint(label).await?;
        METRICS.inc_lifecycle_transitions();
        METRICS.inc_checkpoints_taken();
        Ok(checkpoint)
    }

    pub async fn list_checkpoints(&self) -> ControlResult<Vec<Checkpoint>> {
        Ok(self.lifecycle.list_checkpoints().await?)
    }

    /// Restore the sandbox from the checkpoint carrying `label`.
    pub async fn restore(&self, label: &str) -> ControlResult<SandboxContainer> {
        let checkpoint = self
            .lifecycle
            .find_checkpoint(label)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("no checkpoint labeled {label}")))?;

        let container = self
            .lifecycle
            .restore_from(&checkpoint, &self.sandbox_spec())
            .await?;
        METRICS.inc_lifecycle_transitions();
        Ok(container)
    }

    /// Dispatch an arbitrary tool call through the gate and registry.
    pub async fn call_tool(&self, call: ToolCall) -> ToolResult {
        self.registry.invoke(call).await
    }

    pub async fn read_file(&self, path: &str) -> ToolResult {
        self.call_tool(ToolCall::new("read_file", json!({ "path": path })))
            .await
    }

    pub async fn write_file(&self, path: &str, content: &str) -> ToolResult {
        self.call_tool(ToolCall::new(
            "write_file",
            json!({ "path": path, "content": content }),
        ))
        .await
    }

    pub async fn delete_file(&self, path: &str) -> ToolResult {
        self.call_tool(ToolCall::new("delete_file", json!({ "path": path })))
            .await
    }

    pub async fn list_files(&self, path: &str) -> ToolResult {
        self.call_tool(ToolCall::new("list_directory", json!({ "path": path })))
            .await
    }

    /// Install an external tool server by cloning its repository into the
    /// sandbox and running `npm install` there. The name passes the same
    /// character-class check as package names; the URL must clear the gate's
    /// domain allow-list. Both steps run as argv execs, never through a
    /// shell, so metacharacters in the URL stay inert.
    pub async fn install_tool_server(
        &self,
        name: &str,
        url: &str,
    ) -> ControlResult<ToolServerRecord> {
        let guards = [
            ArgGuard::required("name", GuardKind::PackageName),
            ArgGuard::required("url", GuardKind::FetchUrl),
        ];
        gate::validate(
            self.registry.policy(),
            &guards,
            &json!({ "name": name, "url": url }),
        )
        .map_err(|e| ControlError::InvalidInput(e.to_string()))?;

        let container = self
            .lifecycle
            .current()
            .await
            .filter(|c| c.is_running())
            .ok_or_else(|| ControlError::NotFound("no running sandbox to install into".into()))?;

        let dir = format!("/opt/tool-servers/{name}");
        let steps: [Vec<String>; 2] = [
            vec!["git".into(), "clone".into(), url.into(), dir.clone()],
            vec!["npm".into(), "--prefix".into(), dir, "install".into()],
        ];
        for argv in steps {
            let handle = self.lifecycle.engine().exec(&container.id, argv).await?;

            let mut output = handle.output;
            let mut tail = String::new();
            while let Some(chunk) = output.next().await {
                tail.push_str(&chunk);
            }
            let exit_code = handle.exit_code.await?;
            if exit_code != 0 {
                return Err(ControlError::InstallFailed(format!(
                    "exit code {exit_code}: {}",
                    tail.trim()
                )));
            }
        }

        let record = ToolServerRecord {
            name: name.to_string(),
            url: url.to_string(),
            installed_at: Utc::now(),
        };
        self.tool_servers
            .lock()
            .await
            .insert(name.to_string(), record.clone());
        info!(name, url, "installed tool server");
        Ok(record)
    }

    pub async fn list_tool_servers(&self) -> Vec<ToolServerRecord> {
        self.tool_servers.lock().await.values().cloned().collect()
    }

    pub async fn remove_tool_server(&self, name: &str) -> ControlResult<()> {
        self.tool_servers
            .lock()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ControlError::NotFound(format!("no tool server named {name}")))
    }

    /// Write the tool manifest to its configured path. Called once at
    /// startup; the document is not mutated afterwards.
    pub async fn write_manifest(&self) -> ControlResult<PathBuf> {
        let manifest = ToolManifest::new(self.config.tool_server_url.clone(), self.registry.specs());
        manifest.write_to(&self.config.manifest_path).await?;
        info!(path = %self.config.manifest_path.display(), "wrote tool manifest");
        Ok(self.config.manifest_path.clone())
    }
}
