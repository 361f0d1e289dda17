// In-memory implementations for examples and testing
//
// These keep all data in memory, making them suitable for:
// - Standalone examples that don't need a database
// - Unit tests
// - Single-process deployments where durability is not required

use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::message::{recent_turns, CompletionMetadata, Message, ToolCall, ToolResult};
use crate::traits::{
    CompletionClient, CompletionEvent, CompletionRequest, CompletionStream, HistoryStore,
};

// ============================================================================
// InMemoryHistoryStore
// ============================================================================

/// Volatile history store backed by a keyed map.
///
/// Messages and tool results live in HashMaps keyed by conversation ID.
/// The write lock serializes appends per process, which satisfies the
/// ordering contract for a single-node deployment.
#[derive(Debug, Default, Clone)]
pub struct InMemoryHistoryStore {
    messages: Arc<RwLock<HashMap<String, Vec<Message>>>>,
    tool_results: Arc<RwLock<HashMap<String, Vec<ToolResult>>>>,
}

impl InMemoryHistoryStore {
    /// Create a new in-memory history store
    pub fn new() -> Self {
        Self::default()
    }

    /// Full message log for a conversation (test/debug helper)
    pub async fn messages(&self, conversation_id: &str) -> Vec<Message> {
        self.messages
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Full tool-result audit log for a conversation (test/debug helper)
    pub async fn tool_results(&self, conversation_id: &str) -> Vec<ToolResult> {
        self.tool_results
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Pre-populate a conversation (useful for testing)
    pub async fn seed(&self, conversation_id: impl Into<String>, messages: Vec<Message>) {
        self.messages
            .write()
            .await
            .insert(conversation_id.into(), messages);
    }

    /// Drop all conversations
    pub async fn clear(&self) {
        self.messages.write().await.clear();
        self.tool_results.write().await.clear();
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append_message(&self, conversation_id: &str, message: Message) -> Result<()> {
        self.messages
            .write()
            .await
            .entry(conversation_id.to_string())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn append_tool_result(&self, conversation_id: &str, result: ToolResult) -> Result<()> {
        self.tool_results
            .write()
            .await
            .entry(conversation_id.to_string())
            .or_default()
            .push(result);
        Ok(())
    }

    async fn get_context(&self, conversation_id: &str, max_turns: usize) -> Result<Vec<Message>> {
        let log = self
            .messages
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        Ok(recent_turns(log, max_turns))
    }
}

// ============================================================================
// ScriptedCompletionClient
// ============================================================================

/// One scripted model response
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponse {
    /// Content deltas emitted in order
    pub chunks: Vec<String>,
    /// Tool calls requested after the content
    pub tool_calls: Vec<ToolCall>,
    /// Terminal failure instead of Completed
    pub failure: Option<String>,
}

impl ScriptedResponse {
    /// A plain text response, emitted as a single delta
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            chunks: vec![text.into()],
            ..Self::default()
        }
    }

    /// A text response split into several deltas
    pub fn streamed(chunks: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A response that requests tool calls (with optional leading text)
    pub fn with_tools(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let text = text.into();
        Self {
            chunks: if text.is_empty() { vec![] } else { vec![text] },
            tool_calls,
            ..Self::default()
        }
    }

    /// A call that fails terminally
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Completion client returning scripted responses in sequence.
///
/// Records every prompt it receives so tests can assert on the exact
/// message sequences the engine sends.
#[derive(Debug, Default)]
pub struct ScriptedCompletionClient {
    responses: Arc<RwLock<Vec<ScriptedResponse>>>,
    call_index: Arc<RwLock<usize>>,
    call_log: Arc<RwLock<Vec<Vec<Message>>>>,
}

impl ScriptedCompletionClient {
    /// Create a client with no scripted responses
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client with the given response script
    pub async fn with_responses(responses: Vec<ScriptedResponse>) -> Self {
        let client = Self::new();
        client.set_responses(responses).await;
        client
    }

    /// Queue one more response
    pub async fn add_response(&self, response: ScriptedResponse) {
        self.responses.write().await.push(response);
    }

    /// Replace the whole script and rewind
    pub async fn set_responses(&self, responses: Vec<ScriptedResponse>) {
        *self.responses.write().await = responses;
        *self.call_index.write().await = 0;
    }

    /// Prompts received so far, in call order
    pub async fn calls(&self) -> Vec<Vec<Message>> {
        self.call_log.read().await.clone()
    }

    /// Number of completion calls made
    pub async fn call_count(&self) -> usize {
        self.call_log.read().await.len()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete(
        &self,
        messages: Vec<Message>,
        _request: &CompletionRequest,
    ) -> Result<CompletionStream> {
        self.call_log.write().await.push(messages);

        let mut index = self.call_index.write().await;
        let response = self
            .responses
            .read()
            .await
            .get(*index)
            .cloned()
            .unwrap_or_else(|| {
                ScriptedResponse::text("Scripted response (no more responses configured)")
            });
        *index += 1;
        drop(index);

        let mut events: Vec<Result<CompletionEvent>> = Vec::new();
        for chunk in response.chunks {
            events.push(Ok(CompletionEvent::ContentDelta(chunk)));
        }
        for call in response.tool_calls {
            events.push(Ok(CompletionEvent::ToolCall(call)));
        }
        match response.failure {
            Some(reason) => events.push(Ok(CompletionEvent::Failed(reason))),
            None => events.push(Ok(CompletionEvent::Completed(CompletionMetadata::default()))),
        }

        Ok(Box::pin(stream::iter(events)))
    }
}
