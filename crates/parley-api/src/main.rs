// Parley API server
//
// Bootstraps the service: settings from the environment, a history store
// backend (in-memory or Postgres), the OpenAI-protocol completion client,
// the agent catalog/cache, and the axum router.

mod chat;
mod settings;

use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

use parley_core::support::{support_agent, support_config, SUPPORT_KIND};
use parley_core::{AgentCache, AgentCatalog, CompletionClient, HistoryStore};
use parley_core::memory::InMemoryHistoryStore;
use parley_openai::OpenAiCompletionClient;
use parley_storage::PgHistoryStore;

use settings::{Settings, StorageBackend};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    storage_backend: &'static str,
}

/// State for the health endpoint
#[derive(Clone)]
struct HealthState {
    storage_backend: &'static str,
}

async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        storage_backend: state.storage_backend,
    })
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(chat::chat_stream, chat::chat_complete, chat::list_agents),
    components(schemas(chat::ChatRequest, chat::ChatResponse, chat::AgentsInfo)),
    tags(
        (name = "chat", description = "Agent chat endpoints")
    ),
    info(
        title = "Parley API",
        description = "Conversational agent service with tool calling and streaming output",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn build_history(settings: &Settings) -> Result<Arc<dyn HistoryStore>> {
    match settings.storage_backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryHistoryStore::new())),
        StorageBackend::Postgres => {
            let url = settings
                .database_url
                .as_deref()
                .context("DATABASE_URL required for postgres backend")?;
            let store = PgHistoryStore::from_url(url)
                .await
                .context("Failed to connect to database")?;
            store.migrate().await.context("Failed to run migrations")?;
            tracing::info!("Connected to database");
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley_api=debug,parley_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("parley-api starting...");

    let settings = Settings::from_env().context("Failed to load settings")?;
    tracing::info!(
        storage_backend = settings.storage_backend.as_str(),
        model = %settings.model_name,
        turn_budget = settings.turn_budget,
        "Settings loaded"
    );

    let history = build_history(&settings).await?;

    let completion: Arc<dyn CompletionClient> = match &settings.model_api_base_url {
        Some(base_url) => Arc::new(OpenAiCompletionClient::with_base_url(
            settings.model_api_key.clone(),
            base_url.clone(),
        )),
        None => Arc::new(OpenAiCompletionClient::new(settings.model_api_key.clone())),
    };

    // Agent kinds are registered once here; adding a kind is one entry
    let mut catalog = AgentCatalog::new(history, completion);
    let support = support_config(settings.model_name.clone())
        .with_turn_budget(settings.turn_budget)
        .with_context_turns(settings.context_turns);
    catalog
        .register(SUPPORT_KIND, move |history, completion| {
            support_agent(support.clone(), history, completion)
        })
        .context("Failed to register agent kinds")?;

    let cache = Arc::new(AgentCache::new(catalog));

    let health_state = HealthState {
        storage_backend: settings.storage_backend.as_str(),
    };

    let app = Router::new()
        .route("/health", get(health).with_state(health_state))
        .route("/api-doc/openapi.json", get(openapi_json))
        .merge(chat::routes(chat::AppState::new(cache)))
        // Allow all origins; the test client is served from a different
        // origin in development. Restrict before exposing publicly.
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.bind_addr))?;
    tracing::info!("Listening on {}", settings.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = Router::new().route(
            "/health",
            get(health).with_state(HealthState {
                storage_backend: "memory",
            }),
        );

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["storage_backend"], "memory");
    }

    #[test]
    fn test_openapi_document_builds() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.contains(&&"/v1/chat".to_string()));
        assert!(paths.contains(&&"/v1/chat/complete".to_string()));
        assert!(paths.contains(&&"/v1/agents".to_string()));
    }
}
