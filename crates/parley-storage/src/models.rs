// Database row models
//
// Rows are separate from the core types so schema details (sequence
// numbers, JSONB wrappers) never leak into the engine.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use parley_core::message::{Message, MessageRole, ToolCall, ToolResult};

/// A row in the messages table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub conversation_id: String,
    pub sequence: i64,
    pub role: String,
    pub content: Option<String>,
    pub tool_calls: Option<Json<Vec<ToolCall>>>,
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            role: MessageRole::from(row.role.as_str()),
            content: row.content,
            tool_calls: row.tool_calls.map(|j| j.0).unwrap_or_default(),
            tool_call_id: row.tool_call_id,
            created_at: row.created_at,
        }
    }
}

/// A row in the tool_results audit table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ToolResultRow {
    pub id: Uuid,
    pub conversation_id: String,
    pub sequence: i64,
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: Option<Json<serde_json::Value>>,
    pub error: Option<String>,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl From<ToolResultRow> for ToolResult {
    fn from(row: ToolResultRow) -> Self {
        ToolResult {
            tool_call_id: row.tool_call_id,
            tool_name: row.tool_name,
            result: row.result.map(|j| j.0),
            error: row.error,
            duration_ms: row.duration_ms.max(0) as u64,
        }
    }
}
