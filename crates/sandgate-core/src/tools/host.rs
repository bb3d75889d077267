//! Local execution host backing the built-in tools.
//!
//! File operations receive gate-normalized absolute paths and act on them
//! directly; shell commands run relative to the workspace root.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::process::Command;

use super::error::{ToolError, ToolOutcome};

/// Cap on simplified page text relayed back to the client.
const FETCH_BODY_LIMIT: usize = 5000;
const FETCH_TIMEOUT_SECS: u64 = 30;

/// One entry in a directory listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntryInfo {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Captured output of a finished subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

/// Simplified text and status of a fetched page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
    pub truncated: bool,
}

/// Reduce an HTML document to readable text: drop script and style blocks,
/// drop the remaining tags, collapse runs of whitespace.
fn simplify_html(html: &str) -> String {
    let stripped = strip_blocks(&strip_blocks(html, "script"), "style");

    let mut text = String::with_capacity(stripped.len().min(FETCH_BODY_LIMIT * 2));
    let mut in_tag = false;
    let mut last_space = true;
    for c in stripped.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                if !last_space {
                    text.push(' ');
                    last_space = true;
                }
            }
            _ if in_tag => {}
            c if c.is_whitespace() => {
                if !last_space {
                    text.push(' ');
                    last_space = true;
                }
            }
            c => {
                text.push(c);
                last_space = false;
            }
        }
    }
    text.trim_end().to_string()
}

/// Remove `<element>...</element>` blocks, case-insensitively. An
/// unterminated block swallows the rest of the document.
fn strip_blocks(html: &str, element: &str) -> String {
    let open = format!("<{element}");
    let close = format!("</{element}>");
    let lower = html.to_ascii_lowercase();

    let mut out = String::with_capacity(html.len());
    let mut pos = 0;
    while let Some(offset) = lower[pos..].find(&open) {
        let start = pos + offset;
        out.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(end) => pos = start + end + close.len(),
            None => return out,
        }
    }
    out.push_str(&html[pos..]);
    out
}

/// Shared host for tool handlers: workspace filesystem, subprocesses and
/// outbound HTTP.
pub struct ToolHost {
    workspace_root: PathBuf,
    http: reqwest::Client,
}

impl ToolHost {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            workspace_root: workspace_root.into(),
            http,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// List a directory, entries sorted by name.
    pub async fn list_directory(&self, path: &Path) -> ToolOutcome<Vec<DirEntryInfo>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            let modified_at = metadata.modified().ok().map(DateTime::<Utc>::from);
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path().to_string_lossy().into_owned(),
                is_directory: metadata.is_dir(),
                size: metadata.len(),
                modified_at,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub async fn read_file(&self, path: &Path) -> ToolOutcome<String> {
        Ok(fs::read_to_string(path).await?)
    }

    /// Write a file, creating parent directories as needed.
    pub async fn write_file(&self, path: &Path, contents: &str) -> ToolOutcome<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, contents).await?;
        Ok(())
    }

    pub async fn delete_file(&self, path: &Path) -> ToolOutcome<()> {
        fs::remove_file(path).await?;
        Ok(())
    }

    /// Expand a glob pattern, keeping only matches under the workspace root.
    pub fn find_files(&self, pattern: &str) -> ToolOutcome<Vec<String>> {
        let paths = glob::glob(pattern)
            .map_err(|e| ToolError::Failed(format!("bad glob pattern: {e}")))?;

        let mut matches = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) if path.starts_with(&self.workspace_root) => {
                    matches.push(path.to_string_lossy().into_owned());
                }
                _ => {}
            }
        }
        matches.sort();
        Ok(matches)
    }

    /// Run an allow-listed shell command to completion in the workspace.
    pub async fn run_shell(&self, command: &str) -> ToolOutcome<CommandOutput> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workspace_root)
            .output()
            .await?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().map(i64::from).unwrap_or(-1),
        })
    }

    /// Install a package through the named manager.
    pub async fn install_package(&self, manager: &str, package: &str) -> ToolOutcome<CommandOutput> {
        let argv: &[&str] = match manager {
            "npm" => &["npm", "install", "--save", package],
            "pip" => &["pip", "install", package],
            other => {
                return Err(ToolError::Failed(format!(
                    "unsupported package manager: {other}"
                )))
            }
        };

        let output = Command::new(argv[0])
            .args(&argv[1..])
            .current_dir(&self.workspace_root)
            .output()
            .await?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().map(i64::from).unwrap_or(-1),
        })
    }

    /// Fetch a page over HTTP and simplify it to readable text, truncating
    /// oversized results.
    pub async fn fetch_url(&self, url: &str) -> ToolOutcome<FetchedPage> {
        let response = self.http.get(url).send().await?;
        let status = response.status().as_u16();
        let mut body = simplify_html(&response.text().await?);

        let truncated = body.len() > FETCH_BODY_LIMIT;
        if truncated {
            let mut end = FETCH_BODY_LIMIT;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }

        Ok(FetchedPage {
            url: url.to_string(),
            status,
            body,
            truncated,
        })
    }
}
