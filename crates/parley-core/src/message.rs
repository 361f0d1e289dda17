// Message types
//
// Message is a storage-agnostic record of one entry in a conversation.
// Assistant messages carry their tool calls inline; tool results are
// `tool`-role messages correlated via tool_call_id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message role in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// System message (persona / instructions)
    System,
    /// User message
    User,
    /// Assistant response (may carry tool calls)
    Assistant,
    /// Tool execution result
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

impl From<&str> for MessageRole {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "system" => MessageRole::System,
            "assistant" => MessageRole::Assistant,
            "tool" => MessageRole::Tool,
            _ => MessageRole::User,
        }
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique within a turn; assigned by the model
    pub id: String,
    /// Name of the registered tool
    pub name: String,
    /// Structured arguments conforming to the tool's parameter schema
    pub arguments: serde_json::Value,
}

/// Outcome of one tool dispatch
///
/// Appended to history as a `tool` message and retained in a separate
/// audit log for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The tool call this result answers
    pub tool_call_id: String,
    /// Name of the dispatched tool
    pub tool_name: String,
    /// Structured result on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error descriptor on failure (model-visible)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock dispatch duration
    pub duration_ms: u64,
}

/// Metadata reported when a completion stream finishes
#[derive(Debug, Clone, Default)]
pub struct CompletionMetadata {
    pub total_tokens: Option<u32>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub model: Option<String>,
    pub finish_reason: Option<String>,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: Uuid,

    /// Message role
    pub role: MessageRole,

    /// Text content; None for assistant messages that only request tools
    pub content: Option<String>,

    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Back-reference for `tool` messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp when the message was created
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: MessageRole::User,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: MessageRole::Assistant,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    /// Create an assistant message that requests tool calls
    ///
    /// `content` may be empty when the model emitted no text alongside
    /// the calls; it is stored as None in that case.
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let content = content.into();
        Self {
            id: Uuid::now_v7(),
            role: MessageRole::Assistant,
            content: if content.is_empty() {
                None
            } else {
                Some(content)
            },
            tool_calls,
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: MessageRole::System,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    /// Create a `tool` message from a dispatch result
    pub fn tool_result(result: &ToolResult) -> Self {
        let content = match (&result.result, &result.error) {
            (_, Some(err)) => format!("Error executing tool '{}': {}", result.tool_name, err),
            (Some(value), None) => serde_json::to_string(value).unwrap_or_else(|_| "{}".into()),
            (None, None) => "{}".to_string(),
        };
        Self {
            id: Uuid::now_v7(),
            role: MessageRole::Tool,
            content: Some(content),
            tool_calls: Vec::new(),
            tool_call_id: Some(result.tool_call_id.clone()),
            created_at: Utc::now(),
        }
    }

    /// Text content, if any
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Check if this message requests tool calls
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Keep the most recent `max_turns` exchanges of a message log, oldest first.
///
/// A turn starts at a user message and runs through everything up to (but
/// not including) the next user message, so an assistant tool request and
/// its tool results always stay in the same turn. Leading messages that
/// precede any user message are dropped as orphans. `max_turns` of zero
/// keeps nothing.
pub fn recent_turns(messages: Vec<Message>, max_turns: usize) -> Vec<Message> {
    if messages.is_empty() || max_turns == 0 {
        return Vec::new();
    }

    let mut turns: Vec<Vec<Message>> = Vec::new();
    let mut current: Vec<Message> = Vec::new();

    for msg in messages {
        match msg.role {
            MessageRole::User => {
                if !current.is_empty() {
                    turns.push(std::mem::take(&mut current));
                }
                current.push(msg);
            }
            MessageRole::Assistant | MessageRole::Tool => {
                // Orphaned reply without a user message; skip
                if !current.is_empty() {
                    current.push(msg);
                }
            }
            // Persona is prepended per call, never stored; drop any strays
            MessageRole::System => {}
        }
    }
    if !current.is_empty() {
        turns.push(current);
    }

    let skip = turns.len().saturating_sub(max_turns);
    turns.into_iter().skip(skip).flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "search_faq".to_string(),
            arguments: json!({"query": "refund"}),
        }
    }

    fn completed_turn(user: &str, reply: &str) -> Vec<Message> {
        vec![Message::user(user), Message::assistant(reply)]
    }

    #[test]
    fn test_user_message() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.text(), Some("Hello"));
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn test_assistant_with_tools_empty_content() {
        let msg = Message::assistant_with_tools("", vec![tool_call("call_1")]);
        assert_eq!(msg.content, None);
        assert!(msg.has_tool_calls());
    }

    #[test]
    fn test_tool_result_message() {
        let result = ToolResult {
            tool_call_id: "call_123".to_string(),
            tool_name: "search_faq".to_string(),
            result: Some(json!({"results_count": 1})),
            error: None,
            duration_ms: 12,
        };
        let msg = Message::tool_result(&result);
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id, Some("call_123".to_string()));
        assert_eq!(msg.text(), Some(r#"{"results_count":1}"#));
    }

    #[test]
    fn test_tool_result_error_message() {
        let result = ToolResult {
            tool_call_id: "call_9".to_string(),
            tool_name: "create_ticket".to_string(),
            result: None,
            error: Some("timed out".to_string()),
            duration_ms: 30_000,
        };
        let msg = Message::tool_result(&result);
        assert_eq!(
            msg.text(),
            Some("Error executing tool 'create_ticket': timed out")
        );
    }

    #[test]
    fn test_role_round_trip() {
        for role in ["system", "user", "assistant", "tool"] {
            assert_eq!(MessageRole::from(role).to_string(), role);
        }
    }

    #[test]
    fn test_recent_turns_returns_all_when_fewer() {
        let mut log = completed_turn("hi", "hello");
        log.extend(completed_turn("how are you", "fine"));
        let window = recent_turns(log.clone(), 5);
        assert_eq!(window.len(), 4);
        assert_eq!(window[0].text(), Some("hi"));
    }

    #[test]
    fn test_recent_turns_keeps_newest() {
        let mut log = Vec::new();
        for i in 0..6 {
            log.extend(completed_turn(&format!("q{i}"), &format!("a{i}")));
        }
        let window = recent_turns(log, 2);
        assert_eq!(window.len(), 4);
        assert_eq!(window[0].text(), Some("q4"));
        assert_eq!(window[3].text(), Some("a5"));
    }

    #[test]
    fn test_recent_turns_never_splits_tool_exchange() {
        // Turn 1 contains a tool-call/tool-result pair; truncating to one
        // turn must keep the later turn intact and drop turn 1 whole.
        let result = ToolResult {
            tool_call_id: "call_1".to_string(),
            tool_name: "search_faq".to_string(),
            result: Some(json!({"ok": true})),
            error: None,
            duration_ms: 3,
        };
        let log = vec![
            Message::user("find the refund policy"),
            Message::assistant_with_tools("", vec![tool_call("call_1")]),
            Message::tool_result(&result),
            Message::assistant("Here is the policy."),
            Message::user("thanks"),
            Message::assistant("Anytime!"),
        ];

        let window = recent_turns(log.clone(), 1);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].text(), Some("thanks"));

        // With room for both turns the pair stays together and ordered
        let window = recent_turns(log, 2);
        assert_eq!(window.len(), 6);
        assert!(window[1].has_tool_calls());
        assert_eq!(window[2].tool_call_id, Some("call_1".to_string()));
    }

    #[test]
    fn test_recent_turns_drops_orphans_and_system() {
        let log = vec![
            Message::assistant("orphaned reply"),
            Message::system("stray persona"),
            Message::user("hello"),
            Message::assistant("hi"),
        ];
        let window = recent_turns(log, 4);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].role, MessageRole::User);
    }

    #[test]
    fn test_recent_turns_trailing_user_message_is_a_turn() {
        // The just-appended user message forms the newest (incomplete) turn
        let log = vec![
            Message::user("q1"),
            Message::assistant("a1"),
            Message::user("q2"),
        ];
        let window = recent_turns(log, 1);
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].text(), Some("q2"));
    }
}
