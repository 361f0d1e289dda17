// Postgres storage layer with sqlx
//
// This crate provides the durable implementation of the core HistoryStore
// trait. The in-memory implementation lives in parley-core::memory.

pub mod history_store;
pub mod models;

pub use history_store::PgHistoryStore;
pub use models::{MessageRow, ToolResultRow};
