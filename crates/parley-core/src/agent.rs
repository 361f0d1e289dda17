// Agent
//
// An Agent binds a persona (AgentConfig), a ToolRegistry, and a TurnEngine
// over a HistoryStore and CompletionClient. `process_message` is the only
// entry point the transport layer needs: it returns a stream of
// OutputEvents fed by a bounded channel, so a slow consumer back-pressures
// the engine instead of buffering unboundedly.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::config::AgentConfig;
use crate::engine::TurnEngine;
use crate::error::Result;
use crate::events::OutputEvent;
use crate::tools::{Tool, ToolRegistry};
use crate::traits::{CompletionClient, HistoryStore};

/// Capacity of the per-turn output channel
const OUTPUT_CHANNEL_CAPACITY: usize = 32;

/// A configured conversational agent.
pub struct Agent {
    name: String,
    engine: Arc<TurnEngine>,
    // Serializes turns per conversation; interleaved appends from two
    // concurrent turns would corrupt the turn-pairing invariant
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Agent {
    /// Start building an agent
    pub fn builder(name: impl Into<String>, config: AgentConfig) -> AgentBuilder {
        AgentBuilder {
            name: name.into(),
            config,
            registry: ToolRegistry::new(),
            error: None,
        }
    }

    /// The agent's name (its kind tag)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The engine configuration
    pub fn config(&self) -> &AgentConfig {
        self.engine.config()
    }

    /// Specs of the registered tools, in registration order
    pub fn tools(&self) -> Vec<crate::tools::ToolSpec> {
        self.engine.registry().describe_all()
    }

    /// Process one user message within a conversation.
    ///
    /// Returns a stream yielding Content fragments followed by exactly one
    /// terminal Done or Error event. Turns for the same conversation_id are
    /// serialized; different conversations proceed concurrently.
    pub async fn process_message(
        &self,
        user_text: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> ReceiverStream<OutputEvent> {
        let user_text = user_text.into();
        let conversation_id = conversation_id.into();
        let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);

        let engine = Arc::clone(&self.engine);
        let name = self.name.clone();
        let lock = self.conversation_lock(&conversation_id).await;

        tokio::spawn(async move {
            let _guard = lock.lock().await;
            info!(
                agent = %name,
                conversation_id = %conversation_id,
                "Processing message"
            );
            engine.run_turn(&conversation_id, &user_text, tx).await;
        });

        ReceiverStream::new(rx)
    }

    async fn conversation_lock(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent").field("name", &self.name).finish()
    }
}

/// Builder for Agent construction.
///
/// Tool registration failures (duplicate names) are carried until `build`
/// and reported there, so construction has a single fallible step.
pub struct AgentBuilder {
    name: String,
    config: AgentConfig,
    registry: ToolRegistry,
    error: Option<crate::error::AgentError>,
}

impl AgentBuilder {
    /// Register a tool
    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.registry.register(tool) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Register an Arc-wrapped tool
    pub fn tool_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.registry.register_arc(tool) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Finish construction over the given backends
    pub fn build(
        self,
        history: Arc<dyn HistoryStore>,
        completion: Arc<dyn CompletionClient>,
    ) -> Result<Agent> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let engine = TurnEngine::new(self.config, history, completion, Arc::new(self.registry));
        Ok(Agent {
            name: self.name,
            engine: Arc::new(engine),
            turn_locks: Mutex::new(HashMap::new()),
        })
    }
}
