// Customer-service example agent
//
// Demonstrates the agent contract end to end: a persona, a ticket store
// shared by two tools, and an FAQ lookup. Registered as the "support" kind.

mod faq;
mod tickets;

pub use faq::SearchFaqTool;
pub use tickets::{CreateTicketTool, Ticket, TicketStore, TicketUpdate, UpdateTicketTool};

use std::sync::Arc;

use crate::agent::Agent;
use crate::config::AgentConfig;
use crate::error::Result;
use crate::traits::{CompletionClient, HistoryStore};

/// Persona for the customer-service agent
pub const SUPPORT_PROMPT: &str = "\
You are CustomerCareBot, a professional and empathetic customer service \
representative who helps customers resolve their issues efficiently and \
with care.

Operating principles:
1. Listen first: understand the customer's issue before responding.
2. Resolve immediately when possible: search the FAQ with search_faq for \
common questions about policies, billing, shipping, and accounts before \
anything else.
3. Escalate deliberately: use create_ticket only when the issue needs \
tracking or investigation, and collect the customer's name, email, a clear \
description, and an appropriate priority first.
4. Use update_ticket to record status changes or new information on an \
existing ticket when the customer provides its reference number.
5. Set expectations: after creating a ticket, tell the customer its \
reference number and the estimated response time.

Communication style: professional but warm, clear and concise, \
solution-oriented. Acknowledge the customer's concern, explain what you \
are doing, and finish by asking whether anything else is needed. If a tool \
fails, apologize for the technical difficulty and offer to create a ticket \
so the issue is tracked.";

/// The kind tag under which this agent is registered
pub const SUPPORT_KIND: &str = "support";

/// Build the customer-service agent over the given backends.
///
/// The ticket store is created per agent instance, so cached agents keep
/// their tickets for the lifetime of the cache entry.
pub fn support_agent(
    config: AgentConfig,
    history: Arc<dyn HistoryStore>,
    completion: Arc<dyn CompletionClient>,
) -> Result<Agent> {
    let tickets = TicketStore::new();
    Agent::builder(SUPPORT_KIND, config)
        .tool(CreateTicketTool::new(tickets.clone()))
        .tool(UpdateTicketTool::new(tickets))
        .tool(SearchFaqTool)
        .build(history, completion)
}

/// Default configuration for the support agent with the given model
pub fn support_config(model: impl Into<String>) -> AgentConfig {
    AgentConfig::new(SUPPORT_PROMPT, model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryHistoryStore, ScriptedCompletionClient};

    #[tokio::test]
    async fn test_support_agent_tool_lineup() {
        let agent = support_agent(
            support_config("test-model"),
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(ScriptedCompletionClient::new()),
        )
        .unwrap();

        assert_eq!(agent.name(), SUPPORT_KIND);
        assert!(agent.config().system_prompt.contains("CustomerCareBot"));

        let names: Vec<String> = agent.tools().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["create_ticket", "update_ticket", "search_faq"]);
    }
}
