// Core traits for pluggable backends
//
// These traits let the turn engine run against different backends:
// - In-memory implementations for examples and testing
// - Postgres implementation for production (parley-storage)
// - Any OpenAI-protocol model endpoint (parley-openai)

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::Result;
use crate::message::{CompletionMetadata, Message, ToolCall, ToolResult};
use crate::tools::ToolSpec;

// ============================================================================
// HistoryStore - durable conversation history
// ============================================================================

/// Keyed, append-only storage of per-conversation messages and tool results.
///
/// The turn engine is the only writer. Implementations must preserve append
/// order, guarantee read-after-write visibility within one turn, and fail
/// with `AgentError::StorageUnavailable` rather than dropping data when the
/// backend cannot be reached.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a message to the ordered conversation log
    async fn append_message(&self, conversation_id: &str, message: Message) -> Result<()>;

    /// Record a tool dispatch outcome in the separate audit log
    async fn append_tool_result(&self, conversation_id: &str, result: ToolResult) -> Result<()>;

    /// Load the most recent `max_turns` exchanges, oldest first.
    ///
    /// A turn is one user message plus everything through the assistant's
    /// final response; a tool call and its result are never split across
    /// the truncation boundary. Returns all history when fewer turns exist.
    async fn get_context(&self, conversation_id: &str, max_turns: usize) -> Result<Vec<Message>>;
}

// ============================================================================
// CompletionClient - the language-model boundary
// ============================================================================

/// Type alias for the completion event stream
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<CompletionEvent>> + Send>>;

/// Events emitted while a completion streams back
#[derive(Debug, Clone)]
pub enum CompletionEvent {
    /// A fragment of assistant-visible text; concatenation of all deltas
    /// for one call yields the full assistant message
    ContentDelta(String),
    /// The model requested a tool invocation (zero or more per call)
    ToolCall(ToolCall),
    /// Terminal: the call finished cleanly
    Completed(CompletionMetadata),
    /// Terminal: network or model error
    Failed(String),
}

/// Settings for one completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub tools: Vec<ToolSpec>,
}

/// A language-model completion endpoint.
///
/// The returned stream is finite and not restartable; the turn engine
/// consumes it exactly once per call.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Start a streaming completion over the given message sequence
    async fn complete(
        &self,
        messages: Vec<Message>,
        request: &CompletionRequest,
    ) -> Result<CompletionStream>;
}
