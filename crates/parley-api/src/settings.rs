// Environment configuration
//
// Settings are read once at startup and threaded explicitly into
// construction; nothing else in the service reads the environment.

use anyhow::{Context, Result};

/// Which history store backend to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process-local keyed map; volatile
    Memory,
    /// Postgres via sqlx; durable
    Postgres,
}

impl StorageBackend {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            other => anyhow::bail!("unsupported STORAGE_BACKEND: {other} (expected memory or postgres)"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Postgres => "postgres",
        }
    }
}

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub model_api_key: String,
    pub model_api_base_url: Option<String>,
    pub model_name: String,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub turn_budget: usize,
    pub context_turns: usize,
    pub bind_addr: String,
}

impl Settings {
    /// Load settings from the environment
    pub fn from_env() -> Result<Self> {
        let storage_backend = StorageBackend::parse(
            &std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "memory".to_string()),
        )?;

        let database_url = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required when STORAGE_BACKEND=postgres");
        }

        Ok(Self {
            model_api_key: std::env::var("MODEL_API_KEY").unwrap_or_default(),
            model_api_base_url: std::env::var("MODEL_API_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            model_name: std::env::var("MODEL_NAME").unwrap_or_else(|_| "gpt-4o".to_string()),
            storage_backend,
            database_url,
            turn_budget: parse_var("MAX_TOOL_ITERATIONS", 4)?,
            context_turns: parse_var("CHAT_HISTORY_TURNS", 5)?,
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
        })
    }
}

fn parse_var(name: &str, default: usize) -> Result<usize> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{name} must be a positive integer, got {value:?}")),
        Err(_) => Ok(default),
    }
}
