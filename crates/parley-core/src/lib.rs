// Agent execution engine
//
// This crate provides a storage- and model-agnostic implementation of a
// conversational agent turn (context assembly → model call → tool
// execution → repeat, streamed back to the caller).
//
// Key design decisions:
// - Traits (HistoryStore, CompletionClient) make backends pluggable
// - Tools are defined via a Tool trait; ToolRegistry preserves
//   registration order and absorbs dispatch failures into model-visible
//   error descriptors
// - Output streaming is an explicit producer pushing OutputEvents into a
//   bounded channel consumed by the transport layer
// - Turns for one conversation are serialized; conversations are
//   independent and concurrent
// - Agent kinds live in a catalog populated at process start; constructed
//   agents are cached with LRU + TTL eviction

pub mod agent;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod message;
pub mod tools;
pub mod traits;

// In-memory implementations for examples and testing
pub mod memory;

// Customer-service example agent
pub mod support;

// Re-exports for convenience
pub use agent::{Agent, AgentBuilder};
pub use catalog::{AgentCache, AgentCatalog, AgentFactory};
pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use events::OutputEvent;
pub use message::{
    recent_turns, CompletionMetadata, Message, MessageRole, ToolCall, ToolResult,
};
pub use tools::{EchoTool, FailingTool, Tool, ToolOutcome, ToolRegistry, ToolSpec};
pub use traits::{
    CompletionClient, CompletionEvent, CompletionRequest, CompletionStream, HistoryStore,
};
