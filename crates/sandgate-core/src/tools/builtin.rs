//! Built-in sandbox tools and their registration.
//!
//! Each tool declares a JSON-schema-style parameter document for clients and
//! the guards the gate applies before its handler runs.

use std::path::Path;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{json, Value};

use crate::gate::{ArgGuard, GatePolicy, GuardKind};

use super::error::{ToolError, ToolOutcome};
use super::host::ToolHost;
use super::registry::{ToolHandler, ToolRegistry, ToolSpec};

/// Registry pre-loaded with every built-in tool.
pub fn builtin_registry(policy: GatePolicy, host: Arc<ToolHost>) -> ToolRegistry {
    let mut registry = ToolRegistry::new(policy);
    for (spec, guards, handler) in [
        read_file_tool(host.clone()),
        write_file_tool(host.clone()),
        delete_file_tool(host.clone()),
        list_directory_tool(host.clone()),
        find_files_tool(host.clone()),
        execute_command_tool(host.clone()),
        browse_web_tool(host.clone()),
        install_package_tool(host),
    ] {
        registry.register(spec, guards, handler);
    }
    registry
}

fn wrap<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ToolOutcome<Value>> + Send + 'static,
{
    Arc::new(move |arguments| f(arguments).boxed())
}

fn required_str(arguments: &Value, key: &str) -> ToolOutcome<String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ToolError::Failed(format!("missing argument: {key}")))
}

fn read_file_tool(host: Arc<ToolHost>) -> (ToolSpec, Vec<ArgGuard>, ToolHandler) {
    let spec = ToolSpec {
        name: "read_file".into(),
        description: "Read the contents of a file in the sandbox workspace".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file, relative to the workspace root"
                }
            },
            "required": ["path"]
        }),
    };
    let guards = vec![ArgGuard::required("path", GuardKind::WorkspacePath)];
    let handler = wrap(move |arguments| {
        let host = host.clone();
        async move {
            let path = required_str(&arguments, "path")?;
            let content = host.read_file(Path::new(&path)).await?;
            Ok(json!({"path": path, "content": content}))
        }
    });
    (spec, guards, handler)
}

fn write_file_tool(host: Arc<ToolHost>) -> (ToolSpec, Vec<ArgGuard>, ToolHandler) {
    let spec = ToolSpec {
        name: "write_file".into(),
        description: "Write a file in the sandbox workspace, creating parent directories".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file, relative to the workspace root"
                },
                "content": {
                    "type": "string",
                    "description": "Full contents to write"
                }
            },
            "required": ["path", "content"]
        }),
    };
    let guards = vec![ArgGuard::required("path", GuardKind::WorkspacePath)];
    let handler = wrap(move |arguments| {
        let host = host.clone();
        async move {
            let path = required_str(&arguments, "path")?;
            let content = required_str(&arguments, "content")?;
            host.write_file(Path::new(&path), &content).await?;
            Ok(json!({"path": path, "bytes_written": content.len()}))
        }
    });
    (spec, guards, handler)
}

fn delete_file_tool(host: Arc<ToolHost>) -> (ToolSpec, Vec<ArgGuard>, ToolHandler) {
    let spec = ToolSpec {
        name: "delete_file".into(),
        description: "Delete a file in the sandbox workspace".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file, relative to the workspace root"
                }
            },
            "required": ["path"]
        }),
    };
    let guards = vec![ArgGuard::required("path", GuardKind::WorkspacePath)];
    let handler = wrap(move |arguments| {
        let host = host.clone();
        async move {
            let path = required_str(&arguments, "path")?;
            host.delete_file(Path::new(&path)).await?;
            Ok(json!({"path": path, "deleted": true}))
        }
    });
    (spec, guards, handler)
}

fn list_directory_tool(host: Arc<ToolHost>) -> (ToolSpec, Vec<ArgGuard>, ToolHandler) {
    let spec = ToolSpec {
        name: "list_directory".into(),
        description: "List the entries of a workspace directory".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the directory, relative to the workspace root; \
                                    defaults to the workspace root itself"
                }
            }
        }),
    };
    let guards = vec![ArgGuard::optional("path", GuardKind::WorkspacePath)];
    let handler = wrap(move |arguments| {
        let host = host.clone();
        async move {
            let path = match arguments.get("path").and_then(Value::as_str) {
                Some(path) => path.to_string(),
                None => host.workspace_root().to_string_lossy().into_owned(),
            };
            let entries = host.list_directory(Path::new(&path)).await?;
            Ok(json!({"path": path, "entries": serde_json::to_value(entries)?}))
        }
    });
    (spec, guards, handler)
}

fn find_files_tool(host: Arc<ToolHost>) -> (ToolSpec, Vec<ArgGuard>, ToolHandler) {
    let spec = ToolSpec {
        name: "find_files".into(),
        description: "Find workspace files matching a glob pattern".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern, relative to the workspace root (e.g. src/**/*.rs)"
                }
            },
            "required": ["pattern"]
        }),
    };
    let guards = vec![ArgGuard::required("pattern", GuardKind::WorkspacePath)];
    let handler = wrap(move |arguments| {
        let host = host.clone();
        async move {
            let pattern = required_str(&arguments, "pattern")?;
            let matches = host.find_files(&pattern)?;
            Ok(json!({"pattern": pattern, "matches": matches}))
        }
    });
    (spec, guards, handler)
}

fn execute_command_tool(host: Arc<ToolHost>) -> (ToolSpec, Vec<ArgGuard>, ToolHandler) {
    let spec = ToolSpec {
        name: "execute_command".into(),
        description: "Run an allow-listed shell command in the workspace".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command line; the leading token must be allow-listed"
                }
            },
            "required": ["command"]
        }),
    };
    let guards = vec![ArgGuard::required("command", GuardKind::ShellCommand)];
    let handler = wrap(move |arguments| {
        let host = host.clone();
        async move {
            let command = required_str(&arguments, "command")?;
            let output = host.run_shell(&command).await?;
            Ok(json!({
                "command": command,
                "stdout": output.stdout,
                "stderr": output.stderr,
                "exit_code": output.exit_code,
            }))
        }
    });
    (spec, guards, handler)
}

fn browse_web_tool(host: Arc<ToolHost>) -> (ToolSpec, Vec<ArgGuard>, ToolHandler) {
    let spec = ToolSpec {
        name: "browse_web".into(),
        description: "Fetch a page from an allow-listed documentation domain".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "http(s) URL on an allow-listed domain"
                }
            },
            "required": ["url"]
        }),
    };
    let guards = vec![ArgGuard::required("url", GuardKind::FetchUrl)];
    let handler = wrap(move |arguments| {
        let host = host.clone();
        async move {
            let url = required_str(&arguments, "url")?;
            let page = host.fetch_url(&url).await?;
            Ok(serde_json::to_value(page)?)
        }
    });
    (spec, guards, handler)
}

fn install_package_tool(host: Arc<ToolHost>) -> (ToolSpec, Vec<ArgGuard>, ToolHandler) {
    let spec = ToolSpec {
        name: "install_package".into(),
        description: "Install a package with an approved package manager".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "manager": {
                    "type": "string",
                    "enum": ["npm", "pip"],
                    "description": "Package manager to use"
                },
                "package": {
                    "type": "string",
                    "description": "Package name, letters, digits, dots, dashes and underscores only"
                }
            },
            "required": ["manager", "package"]
        }),
    };
    let guards = vec![
        ArgGuard::required("manager", GuardKind::PackageManager),
        ArgGuard::required("package", GuardKind::PackageName),
    ];
    let handler = wrap(move |arguments| {
        let host = host.clone();
        async move {
            let manager = required_str(&arguments, "manager")?;
            let package = required_str(&arguments, "package")?;
            let output = host.install_package(&manager, &package).await?;
            Ok(json!({
                "manager": manager,
                "package": package,
                "stdout": output.stdout,
                "stderr": output.stderr,
                "exit_code": output.exit_code,
            }))
        }
    });
    (spec, guards, handler)
}

#[cfg(test)]
mod tests {
    use crate::tools::registry::ToolCall;

    use super::*;

    fn fixture() -> (tempfile::TempDir, ToolRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let policy = GatePolicy::rooted_at(dir.path());
        let host = Arc::new(ToolHost::new(dir.path()));
        let registry = builtin_registry(policy, host);
        (dir, registry)
    }

    #[test]
    fn all_builtins_are_registered() {
        let (_dir, registry) = fixture();
        let names: Vec<String> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "browse_web",
                "delete_file",
                "execute_command",
                "find_files",
                "install_package",
                "list_directory",
                "read_file",
                "write_file",
            ]
        );
    }

    #[tokio::test]
    async fn write_then_read_through_dispatch() {
        let (_dir, registry) = fixture();

        let write = registry
            .invoke(ToolCall::new(
                "write_file",
                json!({"path": "notes.txt", "content": "remember the milk"}),
            ))
            .await;
        assert!(write.success, "{write:?}");

        let read = registry
            .invoke(ToolCall::new("read_file", json!({"path": "notes.txt"})))
            .await;
        assert!(read.success);
        assert_eq!(read.payload.unwrap()["content"], json!("remember the milk"));
    }

    #[tokio::test]
    async fn escaping_path_never_reaches_the_filesystem() {
        let (dir, registry) = fixture();

        let result = registry
            .invoke(ToolCall::new(
                "write_file",
                json!({"path": "../outside.txt", "content": "nope"}),
            ))
            .await;

        assert!(!result.success);
        assert!(!dir.path().parent().unwrap().join("outside.txt").exists());
    }

    #[tokio::test]
    async fn allow_listed_command_runs() {
        let (_dir, registry) = fixture();

        let result = registry
            .invoke(ToolCall::new(
                "execute_command",
                json!({"command": "echo sandbox-ready"}),
            ))
            .await;

        assert!(result.success);
        let payload = result.payload.unwrap();
        assert_eq!(payload["exit_code"], json!(0));
        assert_eq!(payload["stdout"].as_str().unwrap().trim(), "sandbox-ready");
    }

    #[tokio::test]
    async fn disallowed_command_token_is_rejected() {
        let (_dir, registry) = fixture();

        let result = registry
            .invoke(ToolCall::new(
                "execute_command",
                json!({"command": "rm -rf /"}),
            ))
            .await;

        assert!(!result.success);
    }

    #[tokio::test]
    async fn shell_injection_in_package_name_is_rejected() {
        let (_dir, registry) = fixture();

        let result = registry
            .invoke(ToolCall::new(
                "install_package",
                json!({"manager": "npm", "package": "lodash; rm -rf /"}),
            ))
            .await;

        assert!(!result.success);
    }

    #[tokio::test]
    async fn off_list_domain_is_rejected_without_a_request() {
        let (_dir, registry) = fixture();

        let result = registry
            .invoke(ToolCall::new(
                "browse_web",
                json!({"url": "https://evil.example.com/payload"}),
            ))
            .await;

        assert!(!result.success);
    }

    #[tokio::test]
    async fn list_directory_defaults_to_the_workspace_root() {
        let (dir, registry) = fixture();
        tokio::fs::write(dir.path().join("readme.md"), "").await.unwrap();

        let result = registry
            .invoke(ToolCall::new("list_directory", json!({})))
            .await;

        assert!(result.success, "{result:?}");
        let payload = result.payload.unwrap();
        let names: Vec<&str> = payload["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["readme.md"]);
    }

    #[tokio::test]
    async fn find_files_matches_workspace_globs() {
        let (dir, registry) = fixture();
        tokio::fs::create_dir_all(dir.path().join("src")).await.unwrap();
        tokio::fs::write(dir.path().join("src/lib.rs"), "").await.unwrap();
        tokio::fs::write(dir.path().join("src/main.rs"), "").await.unwrap();
        tokio::fs::write(dir.path().join("readme.md"), "").await.unwrap();

        let result = registry
            .invoke(ToolCall::new("find_files", json!({"pattern": "src/*.rs"})))
            .await;

        assert!(result.success);
        let matches = result.payload.unwrap()["matches"].as_array().unwrap().len();
        assert_eq!(matches, 2);
    }
}
