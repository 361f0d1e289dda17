// OpenAI-protocol completion client
//
// Implements CompletionClient for OpenAI-compatible chat-completions APIs.
// Streams SSE chunks, forwarding content deltas as they arrive and
// assembling indexed tool-call deltas until the finish marker, at which
// point each completed call is emitted as its own event.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use parley_core::error::{AgentError, Result};
use parley_core::message::{CompletionMetadata, Message, MessageRole, ToolCall};
use parley_core::traits::{
    CompletionClient, CompletionEvent, CompletionRequest, CompletionStream,
};
use parley_core::tools::ToolSpec;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Completion client for OpenAI-compatible APIs.
///
/// # Example
///
/// ```ignore
/// let client = OpenAiCompletionClient::new("your-api-key");
/// // or with a compatible endpoint
/// let client = OpenAiCompletionClient::with_base_url("key", "https://api.example.com/v1/chat/completions");
/// ```
#[derive(Clone)]
pub struct OpenAiCompletionClient {
    client: Client,
    api_key: String,
    api_url: String,
}

impl OpenAiCompletionClient {
    /// Create a new client with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Create a new client from the MODEL_API_KEY environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("MODEL_API_KEY")
            .map_err(|_| AgentError::config("MODEL_API_KEY environment variable not set"))?;
        match std::env::var("MODEL_API_BASE_URL") {
            Ok(url) if !url.is_empty() => Ok(Self::with_base_url(api_key, url)),
            _ => Ok(Self::new(api_key)),
        }
    }

    /// Create a new client with a custom API URL (for compatible APIs)
    pub fn with_base_url(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: api_url.into(),
        }
    }

    fn convert_role(role: MessageRole) -> &'static str {
        match role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }

    fn convert_message(msg: &Message) -> WireMessage {
        WireMessage {
            role: Self::convert_role(msg.role).to_string(),
            content: msg.content.clone(),
            tool_calls: if msg.tool_calls.is_empty() {
                None
            } else {
                Some(
                    msg.tool_calls
                        .iter()
                        .map(|tc| WireToolCall {
                            id: tc.id.clone(),
                            r#type: "function".to_string(),
                            function: WireFunctionCall {
                                name: tc.name.clone(),
                                arguments: serde_json::to_string(&tc.arguments)
                                    .unwrap_or_default(),
                            },
                        })
                        .collect(),
                )
            },
            tool_call_id: msg.tool_call_id.clone(),
        }
    }

    fn convert_tools(tools: &[ToolSpec]) -> Vec<WireTool> {
        tools
            .iter()
            .map(|spec| WireTool {
                r#type: "function".to_string(),
                function: WireFunction {
                    name: spec.name.clone(),
                    description: spec.description.clone(),
                    parameters: spec.parameters.clone(),
                },
            })
            .collect()
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(
        &self,
        messages: Vec<Message>,
        request: &CompletionRequest,
    ) -> Result<CompletionStream> {
        let wire_messages: Vec<WireMessage> = messages.iter().map(Self::convert_message).collect();

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(Self::convert_tools(&request.tools))
        };

        let body = WireRequest {
            model: request.model.clone(),
            messages: wire_messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
            tools,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::model(format!("Failed to send request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AgentError::model(format!(
                "API error ({status}): {error_text}"
            )));
        }

        let event_stream = response.bytes_stream().eventsource();

        let model = request.model.clone();
        let pending_tool_calls = Arc::new(Mutex::new(Vec::<ToolCall>::new()));

        let converted: CompletionStream = Box::pin(
            event_stream
                .map(move |result| -> Vec<Result<CompletionEvent>> {
                    let model = model.clone();
                    let pending = Arc::clone(&pending_tool_calls);

                    match result {
                        Ok(event) => {
                            if event.data == "[DONE]" {
                                return vec![Ok(CompletionEvent::Completed(CompletionMetadata {
                                    model: Some(model),
                                    finish_reason: Some("stop".to_string()),
                                    ..CompletionMetadata::default()
                                }))];
                            }

                            match serde_json::from_str::<WireStreamChunk>(&event.data) {
                                Ok(chunk) => convert_chunk(chunk, &model, &pending),
                                Err(e) => {
                                    vec![Ok(CompletionEvent::Failed(format!(
                                        "Failed to parse chunk: {e}"
                                    )))]
                                }
                            }
                        }
                        Err(e) => vec![Ok(CompletionEvent::Failed(format!("Stream error: {e}")))],
                    }
                })
                .map(stream::iter)
                .flatten(),
        );

        Ok(converted)
    }
}

/// Translate one parsed SSE chunk into zero or more completion events
fn convert_chunk(
    chunk: WireStreamChunk,
    model: &str,
    pending: &Mutex<Vec<ToolCall>>,
) -> Vec<Result<CompletionEvent>> {
    let Some(choice) = chunk.choices.into_iter().next() else {
        return vec![];
    };

    // Tool-call deltas accumulate by index until the finish marker
    if let Some(tool_calls) = &choice.delta.tool_calls {
        let mut acc = pending.lock().unwrap();
        for tc in tool_calls {
            let idx = tc.index as usize;
            while acc.len() <= idx {
                acc.push(ToolCall {
                    id: String::new(),
                    name: String::new(),
                    arguments: json!(""),
                });
            }
            if let Some(id) = &tc.id {
                acc[idx].id = id.clone();
            }
            if let Some(function) = &tc.function {
                if let Some(name) = &function.name {
                    acc[idx].name = name.clone();
                }
                if let Some(args) = &function.arguments {
                    let current = acc[idx].arguments.as_str().unwrap_or("");
                    acc[idx].arguments = json!(format!("{current}{args}"));
                }
            }
        }
        return vec![];
    }

    if let Some(content) = choice.delta.content {
        if content.is_empty() {
            return vec![];
        }
        return vec![Ok(CompletionEvent::ContentDelta(content))];
    }

    if let Some(finish_reason) = choice.finish_reason {
        let mut events: Vec<Result<CompletionEvent>> = Vec::new();

        if finish_reason == "tool_calls" {
            let calls = std::mem::take(&mut *pending.lock().unwrap());
            for mut call in calls {
                // Arguments arrive as a JSON-encoded string; parse now
                if let Some(args_str) = call.arguments.as_str() {
                    call.arguments = serde_json::from_str(args_str).unwrap_or(json!({}));
                }
                events.push(Ok(CompletionEvent::ToolCall(call)));
            }
        }

        events.push(Ok(CompletionEvent::Completed(CompletionMetadata {
            model: Some(model.to_string()),
            finish_reason: Some(finish_reason),
            ..CompletionMetadata::default()
        })));
        return events;
    }

    vec![]
}

impl std::fmt::Debug for OpenAiCompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompletionClient")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    // Serialized even when null: assistant tool-call messages have no text
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireTool {
    r#type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    r#type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    choices: Vec<WireStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireStreamToolCall {
    index: u32,
    id: Option<String>,
    function: Option<WireStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct WireStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_message_with_tool_calls() {
        let msg = Message::assistant_with_tools(
            "",
            vec![ToolCall {
                id: "call_1".to_string(),
                name: "search_faq".to_string(),
                arguments: json!({"query": "refund"}),
            }],
        );
        let wire = OpenAiCompletionClient::convert_message(&msg);

        assert_eq!(wire.role, "assistant");
        assert_eq!(wire.content, None);
        let calls = wire.tool_calls.unwrap();
        assert_eq!(calls[0].function.name, "search_faq");
        assert_eq!(calls[0].function.arguments, r#"{"query":"refund"}"#);
    }

    #[test]
    fn test_convert_tool_result_message() {
        let result = parley_core::message::ToolResult {
            tool_call_id: "call_1".to_string(),
            tool_name: "search_faq".to_string(),
            result: Some(json!({"ok": true})),
            error: None,
            duration_ms: 4,
        };
        let wire = OpenAiCompletionClient::convert_message(&Message::tool_result(&result));

        assert_eq!(wire.role, "tool");
        assert_eq!(wire.tool_call_id.as_deref(), Some("call_1"));
        assert!(wire.content.unwrap().contains("ok"));
    }

    #[test]
    fn test_convert_tools() {
        let specs = vec![ToolSpec {
            name: "echo".to_string(),
            description: "Echo".to_string(),
            parameters: json!({"type": "object"}),
        }];
        let wire = OpenAiCompletionClient::convert_tools(&specs);
        assert_eq!(wire[0].r#type, "function");
        assert_eq!(wire[0].function.name, "echo");
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = OpenAiCompletionClient::new("sk-secret");
        let debug = format!("{client:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
