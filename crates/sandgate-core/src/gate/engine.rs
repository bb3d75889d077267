//! Gate evaluation: apply every declared guard to a tool-call's arguments.

use serde_json::{Map, Value};

use super::error::{GateRejection, GateResult};
use super::policy::{ArgGuard, GatePolicy, GuardKind};
use super::rules;

/// Validate tool-call arguments against the declared guards.
///
/// Guards are checked in declaration order and the first failure wins.
/// On success the returned object carries normalized values (workspace paths
/// are rewritten to their resolved absolute form); arguments without a guard
/// pass through untouched. A `null` arguments value is treated as an empty
/// object so tools without parameters need no special casing.
pub fn validate(
    policy: &GatePolicy,
    guards: &[ArgGuard],
    arguments: &Value,
) -> GateResult<Value> {
    let mut object: Map<String, Value> = match arguments {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(GateRejection::Arguments {
                reason: format!("expected an object, got {}", kind_name(other)),
            });
        }
    };

    for guard in guards {
        let raw = match object.get(&guard.argument) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(GateRejection::Arguments {
                    reason: format!(
                        "argument {} must be a string, got {}",
                        guard.argument,
                        kind_name(other)
                    ),
                });
            }
            None if guard.required => {
                return Err(GateRejection::Arguments {
                    reason: format!("missing required argument {}", guard.argument),
                });
            }
            None => continue,
        };

        match guard.kind {
            GuardKind::WorkspacePath => {
                let resolved = rules::resolve_workspace_path(policy, &raw)?;
                object.insert(
                    guard.argument.clone(),
                    Value::String(resolved.to_string_lossy().into_owned()),
                );
            }
            GuardKind::ShellCommand => rules::check_shell_command(policy, &raw)?,
            GuardKind::PackageName => rules::check_package_name(&raw)?,
            GuardKind::PackageManager => rules::check_package_manager(&raw)?,
            GuardKind::FetchUrl => rules::check_fetch_url(policy, &raw)?,
        }
    }

    Ok(Value::Object(object))
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
