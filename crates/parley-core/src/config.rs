// Agent configuration
//
// AgentConfig is threaded explicitly into Agent/TurnEngine construction;
// nothing in the engine reads configuration ambiently at call sites.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Persona: the fixed system instruction prepended to every model call
    pub system_prompt: String,

    /// Model identifier (e.g., "gpt-4o")
    pub model: String,

    /// Maximum number of tool-resolution iterations per turn
    #[serde(default = "default_turn_budget")]
    pub turn_budget: usize,

    /// How many recent exchanges to include in the context window
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,

    /// Temperature for model sampling (0.0 - 2.0)
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate per response
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Bound on each completion call (and each await on its stream)
    #[serde(default = "default_completion_timeout", with = "duration_secs")]
    pub completion_timeout: Duration,

    /// Bound on each tool dispatch
    #[serde(default = "default_tool_timeout", with = "duration_secs")]
    pub tool_timeout: Duration,
}

fn default_turn_budget() -> usize {
    4
}

fn default_context_turns() -> usize {
    5
}

fn default_completion_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_tool_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Serialize the timeout fields as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl AgentConfig {
    /// Create a new configuration with defaults for everything else
    pub fn new(system_prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            model: model.into(),
            turn_budget: default_turn_budget(),
            context_turns: default_context_turns(),
            temperature: None,
            max_tokens: None,
            completion_timeout: default_completion_timeout(),
            tool_timeout: default_tool_timeout(),
        }
    }

    /// Set the turn budget
    pub fn with_turn_budget(mut self, turn_budget: usize) -> Self {
        self.turn_budget = turn_budget;
        self
    }

    /// Set the context window size in turns
    pub fn with_context_turns(mut self, context_turns: usize) -> Self {
        self.context_turns = context_turns;
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the completion call timeout
    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    /// Set the tool dispatch timeout
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new("You are a helpful assistant.", "gpt-4o")
    }
}
