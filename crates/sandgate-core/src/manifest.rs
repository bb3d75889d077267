//! Generated tool-manifest document advertised to tool-calling clients.
//!
//! Written once at startup to a fixed path inside the workspace; nothing in
//! this crate mutates it afterwards.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

use crate::tools::ToolSpec;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One advertised tool: its schema plus the route clients call it on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub endpoint: String,
}

impl From<ToolSpec> for ManifestEntry {
    fn from(spec: ToolSpec) -> Self {
        let endpoint = format!("/tools/{}", spec.name);
        Self {
            name: spec.name,
            description: spec.description,
            parameters: spec.parameters,
            endpoint,
        }
    }
}

/// Document describing the available tools and where to reach them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolManifest {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub tool_server_url: String,
    pub tools: Vec<ManifestEntry>,
}

impl ToolManifest {
    pub fn new(tool_server_url: impl Into<String>, tools: Vec<ToolSpec>) -> Self {
        Self {
            version: crate::VERSION.to_string(),
            generated_at: Utc::now(),
            tool_server_url: tool_server_url.into(),
            tools: tools.into_iter().map(ManifestEntry::from).collect(),
        }
    }

    /// Write the manifest as pretty JSON, creating parent directories.
    pub async fn write_to(&self, path: &Path) -> Result<(), ManifestError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(self)?;
        fs::write(path, body).await?;
        Ok(())
    }

    pub async fn read_from(path: &Path) -> Result<Self, ManifestError> {
        let body = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&body)?)
    }
}
