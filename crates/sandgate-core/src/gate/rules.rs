//! The individual gate rules.
//!
//! Each rule takes the raw string argument and either returns the normalized
//! form or a [`GateRejection`]. All checks are lexical; nothing here touches
//! the filesystem or the network.

use std::path::{Component, Path, PathBuf};

use url::Url;

use super::error::{GateRejection, GateResult};
use super::policy::GatePolicy;

/// Resolve a path argument against the workspace root.
///
/// Relative paths are joined to the root; absolute paths must already lie
/// under it. `.` and `..` components are resolved component-wise, rejecting
/// any traversal that would climb past the root. The path does not need to
/// exist, since write targets are validated before they are created.
pub fn resolve_workspace_path(policy: &GatePolicy, raw: &str) -> GateResult<PathBuf> {
    if raw.is_empty() {
        return Err(GateRejection::Path {
            reason: "empty path".into(),
        });
    }
    if raw.contains('\0') {
        return Err(GateRejection::Path {
            reason: "path contains a NUL byte".into(),
        });
    }

    let root = policy.workspace_root.as_path();
    let candidate = Path::new(raw);

    // An absolute path is only acceptable as a spelling of a workspace path.
    let relative = match candidate.strip_prefix(root) {
        Ok(rest) => rest,
        Err(_) if candidate.is_absolute() => {
            return Err(GateRejection::Path {
                reason: format!("{raw} is outside the workspace root"),
            });
        }
        Err(_) => candidate,
    };

    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() || !resolved.starts_with(root) {
                    return Err(GateRejection::Path {
                        reason: format!("{raw} escapes the workspace root"),
                    });
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(GateRejection::Path {
                    reason: format!("{raw} could not be normalized"),
                });
            }
        }
    }

    if !resolved.starts_with(root) {
        return Err(GateRejection::Path {
            reason: format!("{raw} escapes the workspace root"),
        });
    }

    Ok(resolved)
}

/// Check a shell command against the leading-token allow-list.
///
/// Only the first whitespace-separated token is inspected; everything after
/// an allowed token passes through untouched.
pub fn check_shell_command(policy: &GatePolicy, command: &str) -> GateResult<()> {
    let token = command.split_whitespace().next().ok_or_else(|| GateRejection::Command {
        reason: "empty command".into(),
    })?;

    if policy.command_allowed(token) {
        Ok(())
    } else {
        Err(GateRejection::Command {
            reason: format!("{token} is not in the allow-list"),
        })
    }
}

/// Check a package name against the `^[A-Za-z0-9._-]+$` character class.
pub fn check_package_name(name: &str) -> GateResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(GateRejection::Package {
            reason: format!("{name} contains characters outside [A-Za-z0-9._-]"),
        })
    }
}

/// Check that a package manager is one the control plane knows how to drive.
pub fn check_package_manager(manager: &str) -> GateResult<()> {
    match manager {
        "npm" | "pip" => Ok(()),
        other => Err(GateRejection::Package {
            reason: format!("unsupported package manager: {other}"),
        }),
    }
}

/// Check a URL argument: http(s) scheme and an allow-listed host.
pub fn check_fetch_url(policy: &GatePolicy, raw: &str) -> GateResult<()> {
    let parsed = Url::parse(raw).map_err(|e| GateRejection::Url {
        reason: format!("{raw} is not a valid URL: {e}"),
    })?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(GateRejection::Url {
                reason: format!("scheme {other} is not allowed"),
            });
        }
    }

    let host = parsed.host_str().ok_or_else(|| GateRejection::Url {
        reason: format!("{raw} has no host"),
    })?;

    if policy.domain_allowed(host) {
        Ok(())
    } else {
        Err(GateRejection::Url {
            reason: format!("{host} is not an allow-listed domain"),
        })
    }
}
