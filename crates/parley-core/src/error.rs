// Error types for the agent engine

use thiserror::Error;

/// Result type alias for agent engine operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur while running a conversation turn
#[derive(Debug, Error)]
pub enum AgentError {
    /// History store backend unreachable; the turn is aborted with no partial writes
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A tool with this name is already registered on the agent
    #[error("duplicate tool name: {0}")]
    DuplicateToolName(String),

    /// Tool name not present in the registry
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Tool handler failure (recovered per-call, fed back to the model)
    #[error("tool execution failed: {0}")]
    ToolExecutionFailed(String),

    /// Completion client transport or model error
    #[error("model call failed: {0}")]
    ModelCallFailed(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AgentError {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        AgentError::StorageUnavailable(msg.into())
    }

    /// Create a tool execution error
    pub fn tool(msg: impl Into<String>) -> Self {
        AgentError::ToolExecutionFailed(msg.into())
    }

    /// Create a model call error
    pub fn model(msg: impl Into<String>) -> Self {
        AgentError::ModelCallFailed(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        AgentError::Configuration(msg.into())
    }
}
