//! String-keyed tool dispatch with uniform gate validation.
//!
//! Every registered tool declares the guards its arguments need, so the
//! capability gate runs before any handler and a new tool cannot skip
//! validation by accident.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::gate::{self, ArgGuard, GatePolicy};
use crate::metrics::METRICS;
use crate::obs;

use super::error::ToolError;

/// Boxed future a tool handler returns.
pub type HandlerFuture = BoxFuture<'static, Result<Value, ToolError>>;

/// Shared, callable tool handler. Receives the gate-normalized arguments.
pub type ToolHandler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// One requested tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub request_id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    /// Build a call with a fresh request id.
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
        }
    }
}

/// Envelope produced exactly once for every [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub request_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ToolResult {
    pub fn ok(request_id: impl Into<String>, payload: Value) -> Self {
        Self {
            request_id: request_id.into(),
            success: true,
            payload: Some(payload),
            error_message: None,
        }
    }

    pub fn failed(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            success: false,
            payload: None,
            error_message: Some(message.into()),
        }
    }
}

/// Advertised description of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON-schema-style parameter document handed to tool-calling clients.
    pub parameters: Value,
}

struct RegisteredTool {
    spec: ToolSpec,
    guards: Vec<ArgGuard>,
    handler: ToolHandler,
}

/// Registry mapping tool name to schema, guards and handler.
///
/// Dispatch holds no locks across handler awaits, so independent calls run
/// concurrently; handlers that touch shared state serialize internally.
pub struct ToolRegistry {
    policy: GatePolicy,
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            policy,
            tools: HashMap::new(),
        }
    }

    /// Register a tool under its spec name. Later registrations under the
    /// same name replace earlier ones.
    pub fn register(&mut self, spec: ToolSpec, guards: Vec<ArgGuard>, handler: ToolHandler) {
        self.tools.insert(
            spec.name.clone(),
            RegisteredTool {
                spec,
                guards,
                handler,
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    /// Specs of every registered tool, sorted by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec.clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Route one call to its handler and return exactly one result envelope.
    ///
    /// Unknown names and gate rejections short-circuit to a failure envelope
    /// without invoking the handler; handler errors are caught and converted
    /// so a bad tool call never propagates past this boundary.
    pub async fn invoke(&self, call: ToolCall) -> ToolResult {
        METRICS.inc_tool_calls();

        let Some(tool) = self.tools.get(&call.name) else {
            return ToolResult::failed(
                call.request_id,
                format!("tool not found: {}", call.name),
            );
        };

        let normalized = match gate::validate(&self.policy, &tool.guards, &call.arguments) {
            Ok(arguments) => arguments,
            Err(rejection) => {
                METRICS.inc_tool_rejections();
                obs::emit_gate_rejected(&call.name, &rejection);
                return ToolResult::failed(call.request_id, rejection.to_string());
            }
        };

        let result = match (tool.handler)(normalized).await {
            Ok(payload) => ToolResult::ok(call.request_id, payload),
            Err(error) => {
                METRICS.inc_tool_failures();
                ToolResult::failed(call.request_id, error.to_string())
            }
        };
        obs::emit_tool_invoked(&call.name, &result.request_id, result.success);
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use crate::gate::GuardKind;

    use super::*;

    fn counting_handler(hits: Arc<AtomicUsize>) -> ToolHandler {
        Arc::new(move |arguments| {
            let hits = hits.clone();
            Box::pin(async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(arguments)
            })
        })
    }

    fn spec(name: &str) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            description: format!("test tool {name}"),
            parameters: json!({"type": "object"}),
        }
    }

    fn registry_with(
        guards: Vec<ArgGuard>,
        hits: Arc<AtomicUsize>,
    ) -> ToolRegistry {
        let mut registry = ToolRegistry::new(GatePolicy::rooted_at("/workspace"));
        registry.register(spec("probe"), guards, counting_handler(hits));
        registry
    }

    #[tokio::test]
    async fn unknown_tool_fails_without_touching_handlers() {
        let hits = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(Vec::new(), hits.clone());

        let result = registry.invoke(ToolCall::new("missing", json!({}))).await;

        assert!(!result.success);
        assert!(result.error_message.as_deref().unwrap().contains("tool not found"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn gate_rejection_short_circuits_before_the_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(
            vec![ArgGuard::required("path", GuardKind::WorkspacePath)],
            hits.clone(),
        );

        let call = ToolCall::new("probe", json!({"path": "../../etc/passwd"}));
        let result = registry.invoke(call).await;

        assert!(!result.success);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handler_receives_normalized_arguments() {
        let hits = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(
            vec![ArgGuard::required("path", GuardKind::WorkspacePath)],
            hits.clone(),
        );

        let call = ToolCall::new("probe", json!({"path": "src/main.rs"}));
        let result = registry.invoke(call).await;

        assert!(result.success);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let payload = result.payload.unwrap();
        assert_eq!(payload["path"], json!("/workspace/src/main.rs"));
    }

    #[tokio::test]
    async fn handler_errors_become_failure_envelopes() {
        let mut registry = ToolRegistry::new(GatePolicy::rooted_at("/workspace"));
        registry.register(
            spec("broken"),
            Vec::new(),
            Arc::new(|_| Box::pin(async { Err(ToolError::Failed("boom".into())) })),
        );

        let call = ToolCall::new("broken", json!({}));
        let request_id = call.request_id.clone();
        let result = registry.invoke(call).await;

        assert!(!result.success);
        assert_eq!(result.request_id, request_id);
        assert_eq!(result.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn specs_are_sorted_by_name() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new(GatePolicy::rooted_at("/workspace"));
        registry.register(spec("zeta"), Vec::new(), counting_handler(hits.clone()));
        registry.register(spec("alpha"), Vec::new(), counting_handler(hits));

        let names: Vec<String> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
