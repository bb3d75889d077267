//! Gate policy and per-tool guard declarations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What a guarded argument is, and therefore which rule applies to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    /// A filesystem path that must stay under the workspace root.
    WorkspacePath,
    /// A shell command whose leading token must be allow-listed.
    ShellCommand,
    /// A package name restricted to `[A-Za-z0-9._-]`.
    PackageName,
    /// A package manager name (`npm` or `pip`).
    PackageManager,
    /// An http(s) URL whose host must match an allow-listed domain.
    FetchUrl,
}

/// Declaration that one named argument of a tool is subject to a gate rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgGuard {
    /// Argument name inside the tool-call arguments object.
    pub argument: String,
    /// Which rule applies.
    pub kind: GuardKind,
    /// Whether the argument must be present. Optional guarded arguments are
    /// validated only when supplied.
    pub required: bool,
}

impl ArgGuard {
    /// Required guarded argument.
    pub fn required(argument: impl Into<String>, kind: GuardKind) -> Self {
        Self {
            argument: argument.into(),
            kind,
            required: true,
        }
    }

    /// Optional guarded argument.
    pub fn optional(argument: impl Into<String>, kind: GuardKind) -> Self {
        Self {
            argument: argument.into(),
            kind,
            required: false,
        }
    }
}

/// The single policy every gate check reads.
///
/// Defaults mirror the shipped sandbox profile: a read-only inspection
/// command allow-list and a documentation-site domain allow-list. The command
/// list checks only the leading token; arguments after an allowed token pass
/// through unchanged. That is a narrow trust boundary, not a sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Root every path argument must resolve under.
    pub workspace_root: PathBuf,
    /// Leading tokens accepted for shell-command arguments.
    pub allowed_commands: Vec<String>,
    /// Domains accepted (exact or dot-suffix) for URL arguments.
    pub allowed_domains: Vec<String>,
}

impl GatePolicy {
    /// Policy rooted at the given workspace with the default allow-lists.
    pub fn rooted_at(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            ..Self::default()
        }
    }

    /// Whether a leading command token is allow-listed.
    pub fn command_allowed(&self, token: &str) -> bool {
        self.allowed_commands.iter().any(|c| c == token)
    }

    /// Whether a hostname matches the domain allow-list exactly or as a
    /// dot-suffix (`api.github.com` matches `github.com`).
    pub fn domain_allowed(&self, host: &str) -> bool {
        self.allowed_domains
            .iter()
            .any(|d| host == d || host.ends_with(&format!(".{d}")))
    }
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("/workspace"),
            allowed_commands: ["ls", "pwd", "echo", "cat", "grep", "find"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_domains: [
                "github.com",
                "stackoverflow.com",
                "developer.mozilla.org",
                "docs.microsoft.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_lists() {
        let policy = GatePolicy::default();
        assert_eq!(policy.allowed_commands.len(), 6);
        assert_eq!(policy.allowed_domains.len(), 4);
        assert!(policy.command_allowed("ls"));
        assert!(!policy.command_allowed("rm"));
    }

    #[test]
    fn domain_matching_exact_and_suffix() {
        let policy = GatePolicy::default();
        assert!(policy.domain_allowed("github.com"));
        assert!(policy.domain_allowed("gist.github.com"));
        assert!(!policy.domain_allowed("evilgithub.com"));
        assert!(!policy.domain_allowed("github.com.attacker.io"));
    }

    #[test]
    fn policy_serde_roundtrip() {
        let policy = GatePolicy::rooted_at("/srv/box");
        let json = serde_json::to_string(&policy).unwrap();
        let back: GatePolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, back);
    }

    #[test]
    fn guard_constructors() {
        let g = ArgGuard::required("path", GuardKind::WorkspacePath);
        assert!(g.required);
        let g = ArgGuard::optional("path", GuardKind::WorkspacePath);
        assert!(!g.required);
    }
}
