// Tool abstraction for the agent engine
//
// Tools are defined via the `Tool` trait and registered with a
// `ToolRegistry` during agent construction. The registry advertises tool
// schemas to the completion client and dispatches invocation requests.
//
// Design decisions:
// - Registration order is preserved so model-facing tool lists are
//   deterministic across calls
// - Duplicate names are rejected at registration (fatal at construction)
// - Dispatch never propagates a failure: unknown names and handler errors
//   become error-descriptor ToolResults the model can react to
// - Internal errors are logged but not exposed to the LLM (security)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::error;

use crate::error::{AgentError, Result};
use crate::message::{ToolCall, ToolResult};

// ============================================================================
// ToolSpec - the model-facing description
// ============================================================================

/// Description of a tool as advertised to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique name per agent
    pub name: String,
    /// What the tool does; the model uses this to decide when to call it
    pub description: String,
    /// JSON Schema for the tool's arguments
    pub parameters: Value,
}

// ============================================================================
// ToolOutcome - error handling contract
// ============================================================================

/// Result of one tool handler execution.
///
/// - `Success`: result is returned to the model
/// - `ToolError`: expected, model-visible failure ("ticket not found")
/// - `InternalError`: system failure; logged, then replaced with a generic
///   message so database errors or keys never leak into model context
#[derive(Debug)]
pub enum ToolOutcome {
    /// Successful execution with a JSON result
    Success(Value),

    /// Tool-level error that is safe to show to the model
    ToolError(String),

    /// Internal/system error that must NOT be exposed to the model
    InternalError(String),
}

impl ToolOutcome {
    /// Create a successful outcome
    pub fn success(value: impl Into<Value>) -> Self {
        ToolOutcome::Success(value.into())
    }

    /// Create a model-visible error
    pub fn tool_error(message: impl Into<String>) -> Self {
        ToolOutcome::ToolError(message.into())
    }

    /// Create an internal error (hidden from the model)
    pub fn internal_error(message: impl Into<String>) -> Self {
        ToolOutcome::InternalError(message.into())
    }

    /// Package the outcome as a ToolResult for the turn engine.
    ///
    /// Internal errors are logged here and replaced with a generic
    /// descriptor before the model sees them.
    fn into_tool_result(self, call: &ToolCall, duration: Duration) -> ToolResult {
        let duration_ms = duration.as_millis() as u64;
        match self {
            ToolOutcome::Success(value) => ToolResult {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                result: Some(value),
                error: None,
                duration_ms,
            },
            ToolOutcome::ToolError(message) => ToolResult {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                result: None,
                error: Some(message),
                duration_ms,
            },
            ToolOutcome::InternalError(message) => {
                error!(
                    tool_name = %call.name,
                    tool_call_id = %call.id,
                    error = %message,
                    "Tool internal error (details hidden from model)"
                );
                ToolResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    result: None,
                    error: Some("An internal error occurred while executing the tool".into()),
                    duration_ms,
                }
            }
        }
    }
}

// ============================================================================
// Tool trait
// ============================================================================

/// A callable capability the model may invoke.
///
/// # Example
///
/// ```ignore
/// struct Echo;
///
/// #[async_trait]
/// impl Tool for Echo {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     fn description(&self) -> &str {
///         "Echo back the provided message."
///     }
///
///     fn parameters_schema(&self) -> Value {
///         json!({
///             "type": "object",
///             "properties": {
///                 "message": {"type": "string"}
///             },
///             "required": ["message"]
///         })
///     }
///
///     async fn execute(&self, arguments: Value) -> ToolOutcome {
///         ToolOutcome::success(json!({"echoed": arguments["message"]}))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's unique name, used by the model to invoke it
    fn name(&self) -> &str;

    /// Description shown to the model
    fn description(&self) -> &str;

    /// JSON Schema for the expected arguments
    fn parameters_schema(&self) -> Value;

    /// Execute the tool. Arguments come from untrusted model output and
    /// should be validated by the handler.
    async fn execute(&self, arguments: Value) -> ToolOutcome;

    /// Model-facing spec for this tool
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

// ============================================================================
// ToolRegistry
// ============================================================================

/// Per-agent collection of tools, immutable after agent construction.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    // Registration order drives describe_all; the index is a lookup aid
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool.
    ///
    /// Fails with `AgentError::DuplicateToolName` when the name is taken;
    /// registration-time failures are fatal at agent construction.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register an Arc-wrapped tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(AgentError::DuplicateToolName(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Check if a tool is registered
    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// All tool specs in registration order
    pub fn describe_all(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    /// Dispatch a tool call, bounded by `timeout`.
    ///
    /// Never fails the turn: unknown names (the model's output is
    /// untrusted), handler errors, and timeouts all come back as
    /// error-descriptor ToolResults. Wall-clock duration is recorded.
    pub async fn dispatch(&self, call: &ToolCall, timeout: Duration) -> ToolResult {
        let started = Instant::now();

        let Some(tool) = self.get(&call.name) else {
            return ToolOutcome::tool_error(format!("Unknown tool: {}", call.name))
                .into_tool_result(call, started.elapsed());
        };

        let outcome = match tokio::time::timeout(timeout, tool.execute(call.arguments.clone()))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => ToolOutcome::tool_error(format!(
                "Tool call timed out after {}s",
                timeout.as_secs()
            )),
        };

        outcome.into_tool_result(call, started.elapsed())
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

// ============================================================================
// Built-in tools for testing
// ============================================================================

/// A tool that echoes back its arguments (useful for testing)
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo back the provided message. Useful for testing tool execution."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo back"
                }
            },
            "required": ["message"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value) -> ToolOutcome {
        let message = arguments
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        ToolOutcome::success(serde_json::json!({
            "echoed": message,
            "length": message.len()
        }))
    }
}

/// A tool that always fails (useful for testing error handling)
pub struct FailingTool {
    error_message: String,
    internal: bool,
}

impl FailingTool {
    /// Fail with a model-visible error
    pub fn with_tool_error(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            internal: false,
        }
    }

    /// Fail with an internal error
    pub fn with_internal_error(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            internal: true,
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "failing_tool"
    }

    fn description(&self) -> &str {
        "A tool that always fails (for testing error handling)"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    async fn execute(&self, _arguments: Value) -> ToolOutcome {
        if self.internal {
            ToolOutcome::internal_error(self.error_message.clone())
        } else {
            ToolOutcome::tool_error(self.error_message.clone())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow_tool"
        }
        fn description(&self) -> &str {
            "Sleeps longer than any reasonable timeout"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _arguments: Value) -> ToolOutcome {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            ToolOutcome::success(json!({}))
        }
    }

    #[test]
    fn test_registration_order_is_stable() {
        let mut registry = ToolRegistry::new();
        registry
            .register(FailingTool::with_tool_error("nope"))
            .unwrap();
        registry.register(EchoTool).unwrap();

        let names: Vec<String> = registry
            .describe_all()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["failing_tool", "echo"]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();

        let err = registry.register(EchoTool).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateToolName(name) if name == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_success_records_duration() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();

        let result = registry
            .dispatch(&call("echo", json!({"message": "hi"})), Duration::from_secs(5))
            .await;

        assert_eq!(result.tool_call_id, "call_1");
        assert_eq!(result.tool_name, "echo");
        assert!(result.error.is_none());
        assert_eq!(result.result.as_ref().unwrap()["echoed"], "hi");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool_absorbed() {
        let registry = ToolRegistry::new();

        let result = registry
            .dispatch(&call("nonexistent", json!({})), Duration::from_secs(5))
            .await;

        assert!(result.result.is_none());
        assert_eq!(result.error.as_deref(), Some("Unknown tool: nonexistent"));
    }

    #[tokio::test]
    async fn test_dispatch_tool_error_is_model_visible() {
        let mut registry = ToolRegistry::new();
        registry
            .register(FailingTool::with_tool_error("Ticket not found"))
            .unwrap();

        let result = registry
            .dispatch(&call("failing_tool", json!({})), Duration::from_secs(5))
            .await;

        assert_eq!(result.error.as_deref(), Some("Ticket not found"));
    }

    #[tokio::test]
    async fn test_dispatch_internal_error_is_masked() {
        let mut registry = ToolRegistry::new();
        registry
            .register(FailingTool::with_internal_error("postgres://secret failed"))
            .unwrap();

        let result = registry
            .dispatch(&call("failing_tool", json!({})), Duration::from_secs(5))
            .await;

        let error = result.error.unwrap();
        assert!(!error.contains("secret"));
        assert_eq!(error, "An internal error occurred while executing the tool");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_timeout_becomes_error_descriptor() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool).unwrap();

        let result = registry
            .dispatch(&call("slow_tool", json!({})), Duration::from_secs(30))
            .await;

        assert_eq!(result.error.as_deref(), Some("Tool call timed out after 30s"));
    }
}
