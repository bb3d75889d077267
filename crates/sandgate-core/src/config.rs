//! Environment-driven configuration for the control plane.
//!
//! Every knob has a `SANDGATE_*` variable; unset or unparsable values fall
//! back to defaults that match the development sandbox profile.

use std::env;
use std::path::PathBuf;

use tracing::warn;

const DEFAULT_API_PORT: u16 = 3000;
const DEFAULT_SECRET: &str = "default_secret";
const DEFAULT_TOOL_SERVER_URL: &str = "http://localhost:8000";
const DEFAULT_WORKSPACE: &str = "/workspace";
const DEFAULT_SANDBOX_NAME: &str = "dev-sandbox";
const DEFAULT_SANDBOX_IMAGE: &str = "dev-sandbox:latest";
const MANIFEST_RELATIVE_PATH: &str = ".toolrules/index.json";

/// Settings the daemon and CLI assemble the control plane from.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlConfig {
    /// Port the API surface listens on.
    pub api_port: u16,
    /// Shared secret used to sign and check bearer credentials.
    pub credential_secret: String,
    /// Base URL of the in-sandbox tool server, advertised in the manifest.
    pub tool_server_url: String,
    /// Engine socket path; platform default when unset.
    pub engine_socket: Option<String>,
    /// Root every workspace path is confined to.
    pub workspace_root: PathBuf,
    /// Where the generated tool manifest is written at startup.
    pub manifest_path: PathBuf,
    pub sandbox_name: String,
    pub sandbox_image: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        let workspace_root = PathBuf::from(DEFAULT_WORKSPACE);
        let manifest_path = workspace_root.join(MANIFEST_RELATIVE_PATH);
        Self {
            api_port: DEFAULT_API_PORT,
            credential_secret: DEFAULT_SECRET.to_string(),
            tool_server_url: DEFAULT_TOOL_SERVER_URL.to_string(),
            engine_socket: None,
            workspace_root,
            manifest_path,
            sandbox_name: DEFAULT_SANDBOX_NAME.to_string(),
            sandbox_image: DEFAULT_SANDBOX_IMAGE.to_string(),
        }
    }
}

impl ControlConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("SANDGATE_PORT") {
            match raw.parse() {
                Ok(port) => config.api_port = port,
                Err(_) => warn!(value = %raw, "invalid SANDGATE_PORT, using default"),
            }
        }
        if let Some(secret) = lookup("SANDGATE_SECRET") {
            config.credential_secret = secret;
        }
        if let Some(url) = lookup("SANDGATE_TOOL_SERVER_URL") {
            config.tool_server_url = url;
        }
        if let Some(socket) = lookup("SANDGATE_ENGINE_SOCKET") {
            config.engine_socket = Some(socket);
        }
        if let Some(workspace) = lookup("SANDGATE_WORKSPACE") {
            config.workspace_root = PathBuf::from(workspace);
            config.manifest_path = config.workspace_root.join(MANIFEST_RELATIVE_PATH);
        }
        if let Some(manifest) = lookup("SANDGATE_MANIFEST") {
            config.manifest_path = PathBuf::from(manifest);
        }
        if let Some(name) = lookup("SANDGATE_SANDBOX_NAME") {
            config.sandbox_name = name;
        }
        if let Some(image) = lookup("SANDGATE_IMAGE") {
            config.sandbox_image = image;
        }

        config
    }
}
