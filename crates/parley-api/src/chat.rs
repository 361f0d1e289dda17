// Chat HTTP routes
//
// POST /v1/chat streams the agent's reply as SSE; POST /v1/chat/complete
// buffers it into one JSON response. GET /v1/agents reports the available
// agent kinds and cache occupancy.

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{convert::Infallible, sync::Arc};
use utoipa::ToSchema;

use parley_core::{AgentCache, OutputEvent};

/// App state for chat routes
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<AgentCache>,
}

impl AppState {
    pub fn new(cache: Arc<AgentCache>) -> Self {
        Self { cache }
    }
}

/// Create chat routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat", post(chat_stream))
        .route("/v1/chat/complete", post(chat_complete))
        .route("/v1/agents", get(list_agents))
        .with_state(state)
}

/// Request to chat with an agent
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChatRequest {
    /// User message to send to the agent
    pub message: String,
    /// Unique conversation identifier
    pub conversation_id: String,
    /// Unique user identifier
    pub user_id: String,
    /// Which agent kind handles the message
    #[serde(default = "default_agent_kind")]
    #[schema(example = "support")]
    pub agent_kind: String,
    /// Additional metadata for the request
    #[serde(default)]
    pub extra_metadata: Option<Value>,
}

fn default_agent_kind() -> String {
    "support".to_string()
}

/// Buffered chat response
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChatResponse {
    /// Full agent reply
    pub content: String,
    /// Conversation identifier
    pub conversation_id: String,
    /// Agent kind that produced the reply
    pub agent_kind: String,
    /// Response timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Available agents and cache stats
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AgentsInfo {
    /// Registered agent kinds, in registration order
    pub agent_kinds: Vec<String>,
    /// Number of currently cached agent instances
    pub cached_agents: usize,
}

impl AppState {
    fn agent_for(
        &self,
        request: &ChatRequest,
    ) -> Result<Arc<parley_core::Agent>, (StatusCode, String)> {
        if !self.cache.catalog().supports(&request.agent_kind) {
            return Err((
                StatusCode::BAD_REQUEST,
                format!(
                    "Agent kind '{}' is not supported. Available kinds: {:?}",
                    request.agent_kind,
                    self.cache.catalog().kinds()
                ),
            ));
        }

        let scope = format!("{}:{}", request.user_id, request.conversation_id);
        self.cache
            .get_or_create(&request.agent_kind, &scope)
            .map_err(|e| {
                tracing::error!("Failed to build agent: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to initialize agent".to_string(),
                )
            })
    }
}

/// POST /v1/chat - Stream a chat reply (SSE)
///
/// Emits `content` events while the agent produces output, then exactly
/// one terminal `done` or `error` event.
#[utoipa::path(
    post,
    path = "/v1/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream"),
        (status = 400, description = "Unsupported agent kind"),
        (status = 500, description = "Internal server error")
    ),
    tag = "chat"
)]
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, (StatusCode, String)> {
    tracing::info!(
        user_id = %request.user_id,
        conversation_id = %request.conversation_id,
        agent_kind = %request.agent_kind,
        "Chat request received"
    );

    let agent = state.agent_for(&request)?;
    let events = agent
        .process_message(request.message, request.conversation_id)
        .await;

    let stream = events.map(|event| {
        let name = match &event {
            OutputEvent::Content { .. } => "content",
            OutputEvent::Done => "done",
            OutputEvent::Error { .. } => "error",
        };
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(SseEvent::default().event(name).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// POST /v1/chat/complete - Buffered chat reply
#[utoipa::path(
    post,
    path = "/v1/chat/complete",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Complete reply", body = ChatResponse),
        (status = 400, description = "Unsupported agent kind"),
        (status = 502, description = "Turn failed")
    ),
    tag = "chat"
)]
pub async fn chat_complete(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let agent = state.agent_for(&request)?;
    let mut events = agent
        .process_message(request.message.clone(), request.conversation_id.clone())
        .await;

    let mut content = String::new();
    while let Some(event) = events.next().await {
        match event {
            OutputEvent::Content { chunk } => content.push_str(&chunk),
            OutputEvent::Done => break,
            OutputEvent::Error { message } => {
                return Err((StatusCode::BAD_GATEWAY, message));
            }
        }
    }

    Ok(Json(ChatResponse {
        content,
        conversation_id: request.conversation_id,
        agent_kind: request.agent_kind,
        timestamp: chrono::Utc::now(),
    }))
}

/// GET /v1/agents - Available agent kinds and cache stats
#[utoipa::path(
    get,
    path = "/v1/agents",
    responses(
        (status = 200, description = "Agent info", body = AgentsInfo)
    ),
    tag = "chat"
)]
pub async fn list_agents(State(state): State<AppState>) -> Json<AgentsInfo> {
    Json(AgentsInfo {
        agent_kinds: state
            .cache
            .catalog()
            .kinds()
            .into_iter()
            .map(String::from)
            .collect(),
        cached_agents: state.cache.len(),
    })
}
