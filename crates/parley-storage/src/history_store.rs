// Postgres-backed HistoryStore implementation
//
// Appends go straight to the messages / tool_results tables; reads order
// by the per-table sequence so the append order is always reproduced.
// Any sqlx error surfaces as AgentError::StorageUnavailable.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use parley_core::error::{AgentError, Result};
use parley_core::message::{recent_turns, Message, ToolResult};
use parley_core::traits::HistoryStore;

use crate::models::MessageRow;

/// Durable history store over Postgres.
#[derive(Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `database_url`
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| AgentError::storage(e.to_string()))?;
        Ok(Self::new(pool))
    }

    /// Run embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AgentError::storage(e.to_string()))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append_message(&self, conversation_id: &str, message: Message) -> Result<()> {
        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(Json(message.tool_calls))
        };

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, tool_calls, tool_call_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(message.id)
        .bind(conversation_id)
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(tool_calls)
        .bind(&message.tool_call_id)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AgentError::storage(e.to_string()))?;

        Ok(())
    }

    async fn append_tool_result(&self, conversation_id: &str, result: ToolResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tool_results (id, conversation_id, tool_call_id, tool_name, result, error, duration_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(conversation_id)
        .bind(&result.tool_call_id)
        .bind(&result.tool_name)
        .bind(result.result.map(Json))
        .bind(&result.error)
        .bind(result.duration_ms as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| AgentError::storage(e.to_string()))?;

        Ok(())
    }

    async fn get_context(&self, conversation_id: &str, max_turns: usize) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, sequence, role, content, tool_calls, tool_call_id, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AgentError::storage(e.to_string()))?;

        let messages = rows.into_iter().map(Message::from).collect();
        Ok(recent_turns(messages, max_turns))
    }
}
