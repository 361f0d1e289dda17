// Turn engine
//
// The orchestrator for one conversation turn. Coordinates:
// - Loading bounded context from the HistoryStore
// - Calling the model via the CompletionClient
// - Resolving tool calls via the ToolRegistry
// - Streaming OutputEvents to the caller through a bounded channel
//
// A turn builds context, awaits the model, dispatches any requested tools,
// and repeats until the model answers with content only or the turn budget
// runs out; a storage or model failure ends the turn with a terminal error
// event. Every message is appended incrementally, so an interruption at any
// point leaves a valid prefix in history rather than a partially written
// turn.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::events::OutputEvent;
use crate::message::{Message, ToolCall};
use crate::tools::ToolRegistry;
use crate::traits::{CompletionClient, CompletionEvent, CompletionRequest, HistoryStore};

/// Fallback reply when the model keeps requesting tools past the budget
const TURN_BUDGET_FALLBACK: &str =
    "I've reached the maximum number of tool iterations. Please try rephrasing your request.";

/// Executes conversation turns against pluggable backends.
pub struct TurnEngine {
    config: AgentConfig,
    history: Arc<dyn HistoryStore>,
    completion: Arc<dyn CompletionClient>,
    registry: Arc<ToolRegistry>,
}

/// What one completion call produced
struct CompletionOutcome {
    text: String,
    tool_calls: Vec<ToolCall>,
}

/// Wraps the caller's output channel.
///
/// When the receiver is dropped mid-stream the sink goes quiet instead of
/// erroring, so the engine can still finish its in-flight history appends
/// and never leaves a user message without a reply.
struct OutputSink {
    tx: mpsc::Sender<OutputEvent>,
    caller_gone: bool,
}

impl OutputSink {
    fn new(tx: mpsc::Sender<OutputEvent>) -> Self {
        Self {
            tx,
            caller_gone: false,
        }
    }

    async fn send(&mut self, event: OutputEvent) {
        if self.caller_gone {
            return;
        }
        if self.tx.send(event).await.is_err() {
            debug!("caller disconnected, no longer forwarding output");
            self.caller_gone = true;
        }
    }
}

impl TurnEngine {
    /// Create a new turn engine
    pub fn new(
        config: AgentConfig,
        history: Arc<dyn HistoryStore>,
        completion: Arc<dyn CompletionClient>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            config,
            history,
            completion,
            registry,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Get the tool registry
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one turn: persist the user message, drive the model/tool loop,
    /// and stream OutputEvents into `output`.
    ///
    /// Always ends the stream with exactly one terminal event. On failure
    /// no partial assistant message is appended; the user message already
    /// written remains, so the conversation record stays consistent.
    pub async fn run_turn(
        &self,
        conversation_id: &str,
        user_text: &str,
        output: mpsc::Sender<OutputEvent>,
    ) {
        let mut sink = OutputSink::new(output);

        match self.drive(conversation_id, user_text, &mut sink).await {
            Ok(iterations) => {
                info!(
                    conversation_id = %conversation_id,
                    iterations = iterations,
                    "Turn completed"
                );
                sink.send(OutputEvent::Done).await;
            }
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Turn failed");
                sink.send(OutputEvent::error(e.to_string())).await;
            }
        }
    }

    /// The turn loop. Returns the number of tool-resolution iterations.
    async fn drive(
        &self,
        conversation_id: &str,
        user_text: &str,
        sink: &mut OutputSink,
    ) -> Result<usize> {
        self.history
            .append_message(conversation_id, Message::user(user_text))
            .await?;

        // The window already ends with the user message appended above
        let mut messages = self
            .history
            .get_context(conversation_id, self.config.context_turns)
            .await?;

        let request = CompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            tools: self.registry.describe_all(),
        };

        let mut iterations = 0;

        loop {
            info!(
                conversation_id = %conversation_id,
                iteration = iterations + 1,
                context_len = messages.len(),
                "Calling model"
            );

            let outcome = self.drive_completion(&messages, &request, sink).await?;

            if outcome.tool_calls.is_empty() {
                // Final assistant response: the accumulated buffer is the message
                self.history
                    .append_message(conversation_id, Message::assistant(outcome.text))
                    .await?;
                return Ok(iterations);
            }

            // Tool branch: persist the assistant request, resolve each call
            let assistant_msg =
                Message::assistant_with_tools(outcome.text, outcome.tool_calls.clone());
            self.history
                .append_message(conversation_id, assistant_msg.clone())
                .await?;
            messages.push(assistant_msg);

            for call in &outcome.tool_calls {
                info!(
                    conversation_id = %conversation_id,
                    tool_name = %call.name,
                    tool_call_id = %call.id,
                    "Dispatching tool"
                );
                let result = self.registry.dispatch(call, self.config.tool_timeout).await;

                let result_msg = Message::tool_result(&result);
                self.history
                    .append_message(conversation_id, result_msg.clone())
                    .await?;
                self.history
                    .append_tool_result(conversation_id, result)
                    .await?;
                messages.push(result_msg);
            }

            iterations += 1;

            if iterations >= self.config.turn_budget {
                // Budget exhausted: synthesize the fallback instead of
                // issuing another model call
                warn!(
                    conversation_id = %conversation_id,
                    turn_budget = self.config.turn_budget,
                    "Turn budget reached, emitting fallback response"
                );
                sink.send(OutputEvent::content(TURN_BUDGET_FALLBACK)).await;
                self.history
                    .append_message(conversation_id, Message::assistant(TURN_BUDGET_FALLBACK))
                    .await?;
                return Ok(iterations);
            }
        }
    }

    /// Call the model once and consume its event stream.
    ///
    /// Content deltas are forwarded to the sink as they arrive and
    /// accumulated for persistence. Both the call and each await on the
    /// stream are bounded by the configured completion timeout; an elapse
    /// is treated the same as a Failed event.
    async fn drive_completion(
        &self,
        context: &[Message],
        request: &CompletionRequest,
        sink: &mut OutputSink,
    ) -> Result<CompletionOutcome> {
        let timeout = self.config.completion_timeout;

        let mut prompt = Vec::with_capacity(context.len() + 1);
        if !self.config.system_prompt.is_empty() {
            prompt.push(Message::system(self.config.system_prompt.clone()));
        }
        prompt.extend_from_slice(context);

        let mut stream = tokio::time::timeout(timeout, self.completion.complete(prompt, request))
            .await
            .map_err(|_| AgentError::model("completion call timed out"))??;

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        loop {
            let event = match tokio::time::timeout(timeout, stream.next()).await {
                Err(_) => return Err(AgentError::model("completion stream timed out")),
                // Stream ended without a terminal event; treat as completed
                Ok(None) => break,
                Ok(Some(event)) => event?,
            };

            match event {
                CompletionEvent::ContentDelta(delta) => {
                    if !delta.is_empty() {
                        text.push_str(&delta);
                        sink.send(OutputEvent::content(delta)).await;
                    }
                }
                CompletionEvent::ToolCall(call) => {
                    tool_calls.push(call);
                }
                CompletionEvent::Completed(_metadata) => break,
                CompletionEvent::Failed(reason) => {
                    return Err(AgentError::model(reason));
                }
            }
        }

        Ok(CompletionOutcome { text, tool_calls })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryHistoryStore, ScriptedCompletionClient, ScriptedResponse};
    use crate::message::MessageRole;
    use crate::tools::{FailingTool, Tool, ToolOutcome};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct TicketStub;

    #[async_trait]
    impl Tool for TicketStub {
        fn name(&self) -> &str {
            "create_ticket"
        }
        fn description(&self) -> &str {
            "Create a support ticket"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"subject": {"type": "string"}}})
        }
        async fn execute(&self, _arguments: Value) -> ToolOutcome {
            ToolOutcome::success(json!({"ticket_id": "TKT-20250101-ABCD1234", "status": "open"}))
        }
    }

    fn tool_call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: json!({"subject": "billing issue"}),
        }
    }

    struct Harness {
        engine: TurnEngine,
        history: InMemoryHistoryStore,
        client: Arc<ScriptedCompletionClient>,
    }

    async fn harness(
        config: AgentConfig,
        responses: Vec<ScriptedResponse>,
        registry: ToolRegistry,
    ) -> Harness {
        let history = InMemoryHistoryStore::new();
        let client = Arc::new(ScriptedCompletionClient::with_responses(responses).await);
        let engine = TurnEngine::new(
            config,
            Arc::new(history.clone()),
            client.clone(),
            Arc::new(registry),
        );
        Harness {
            engine,
            history,
            client,
        }
    }

    async fn collect_events(h: &Harness, conversation_id: &str, text: &str) -> Vec<OutputEvent> {
        let (tx, mut rx) = mpsc::channel(32);
        h.engine.run_turn(conversation_id, text, tx).await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_content_only_turn() {
        let h = harness(
            AgentConfig::new("You are helpful.", "test-model"),
            vec![ScriptedResponse::streamed(["Hel", "lo!"])],
            ToolRegistry::new(),
        )
        .await;

        let events = collect_events(&h, "conv-1", "hi").await;
        assert_eq!(
            events,
            vec![
                OutputEvent::content("Hel"),
                OutputEvent::content("lo!"),
                OutputEvent::Done,
            ]
        );

        let log = h.history.messages("conv-1").await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].role, MessageRole::User);
        assert_eq!(log[1].role, MessageRole::Assistant);
        assert_eq!(log[1].text(), Some("Hello!"));
    }

    #[tokio::test]
    async fn test_ticket_scenario_history_shape() {
        let mut registry = ToolRegistry::new();
        registry.register(TicketStub).unwrap();

        let h = harness(
            AgentConfig::new("persona", "test-model"),
            vec![
                ScriptedResponse::with_tools("", vec![tool_call("call_1", "create_ticket")]),
                ScriptedResponse::text("Your ticket TKT-20250101-ABCD1234 has been created."),
            ],
            registry,
        )
        .await;

        let events = collect_events(&h, "conv-1", "Create a ticket for billing issue").await;
        assert_eq!(events.last(), Some(&OutputEvent::Done));

        // History ends with exactly: user, assistant(tool_calls), tool, assistant(final)
        let log = h.history.messages("conv-1").await;
        assert_eq!(log.len(), 4);
        assert_eq!(log[0].role, MessageRole::User);
        assert_eq!(log[1].role, MessageRole::Assistant);
        assert_eq!(log[1].tool_calls.len(), 1);
        assert_eq!(log[2].role, MessageRole::Tool);
        assert_eq!(log[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(log[3].role, MessageRole::Assistant);
        assert!(log[3].text().unwrap().contains("TKT-20250101"));

        // The audit log captured the dispatch too
        let audit = h.history.tool_results("conv-1").await;
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].tool_name, "create_ticket");
    }

    #[tokio::test]
    async fn test_turn_budget_caps_model_calls() {
        let mut registry = ToolRegistry::new();
        registry.register(TicketStub).unwrap();

        // The model requests a tool call five times in a row
        let responses = (0..5)
            .map(|i| {
                ScriptedResponse::with_tools(
                    "",
                    vec![tool_call(&format!("call_{i}"), "create_ticket")],
                )
            })
            .collect();

        let h = harness(
            AgentConfig::new("persona", "test-model").with_turn_budget(4),
            responses,
            registry,
        )
        .await;

        let events = collect_events(&h, "conv-1", "loop forever").await;

        // Exactly 4 resolution cycles, never a 5th model call
        assert_eq!(h.client.call_count().await, 4);

        // Fallback message streamed and persisted as the final reply
        assert_eq!(
            events[events.len() - 2],
            OutputEvent::content(TURN_BUDGET_FALLBACK)
        );
        assert_eq!(events.last(), Some(&OutputEvent::Done));
        let log = h.history.messages("conv-1").await;
        assert_eq!(log.last().unwrap().text(), Some(TURN_BUDGET_FALLBACK));
        // user + 4 * (assistant + tool) + fallback assistant
        assert_eq!(log.len(), 10);
    }

    #[tokio::test]
    async fn test_tool_failure_feeds_back_to_model() {
        let mut registry = ToolRegistry::new();
        registry
            .register(FailingTool::with_tool_error("City not found"))
            .unwrap();

        let h = harness(
            AgentConfig::new("persona", "test-model"),
            vec![
                ScriptedResponse::with_tools("", vec![tool_call("call_1", "failing_tool")]),
                ScriptedResponse::text("Sorry, that did not work."),
            ],
            registry,
        )
        .await;

        let events = collect_events(&h, "conv-1", "do the thing").await;

        // The turn continues rather than aborting
        assert_eq!(events.last(), Some(&OutputEvent::Done));

        // The error descriptor is model-visible context on the next call
        let calls = h.client.calls().await;
        assert_eq!(calls.len(), 2);
        let second_prompt = &calls[1];
        let tool_msg = second_prompt
            .iter()
            .find(|m| m.role == MessageRole::Tool)
            .expect("tool result present in follow-up prompt");
        assert!(tool_msg.text().unwrap().contains("City not found"));

        let audit = h.history.tool_results("conv-1").await;
        assert_eq!(audit[0].error.as_deref(), Some("City not found"));
    }

    #[tokio::test]
    async fn test_model_failure_on_first_call() {
        let h = harness(
            AgentConfig::new("persona", "test-model"),
            vec![ScriptedResponse::failure("connection reset")],
            ToolRegistry::new(),
        )
        .await;

        let events = collect_events(&h, "conv-1", "hello?").await;

        // A single terminal error event, nothing else
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], OutputEvent::Error { message } if message.contains("connection reset")));

        // No assistant message was appended; the user message remains
        let log = h.history.messages("conv-1").await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_appends_no_partial_message() {
        let h = harness(
            AgentConfig::new("persona", "test-model"),
            vec![ScriptedResponse {
                chunks: vec!["partial ".into()],
                tool_calls: vec![],
                failure: Some("stream died".into()),
            }],
            ToolRegistry::new(),
        )
        .await;

        let events = collect_events(&h, "conv-1", "hello?").await;

        // The delta that already streamed was forwarded, then the error
        assert_eq!(events[0], OutputEvent::content("partial "));
        assert!(events.last().unwrap().is_terminal());
        assert!(matches!(events.last(), Some(OutputEvent::Error { .. })));

        let log = h.history.messages("conv-1").await;
        assert_eq!(log.len(), 1, "partial assistant output must not persist");
    }

    #[tokio::test]
    async fn test_prompt_assembly_persona_and_context() {
        let h = harness(
            AgentConfig::new("You are CustomerCareBot.", "test-model").with_context_turns(5),
            vec![ScriptedResponse::text("again!")],
            ToolRegistry::new(),
        )
        .await;

        h.history
            .seed(
                "conv-1",
                vec![Message::user("earlier"), Message::assistant("reply")],
            )
            .await;

        collect_events(&h, "conv-1", "and now").await;

        let calls = h.client.calls().await;
        let prompt = &calls[0];
        assert_eq!(prompt[0].role, MessageRole::System);
        assert_eq!(prompt[0].text(), Some("You are CustomerCareBot."));
        assert_eq!(prompt[1].text(), Some("earlier"));
        assert_eq!(prompt[2].text(), Some("reply"));
        assert_eq!(prompt.last().unwrap().text(), Some("and now"));
    }

    #[tokio::test]
    async fn test_context_window_drops_old_turns() {
        let h = harness(
            AgentConfig::new("p", "test-model").with_context_turns(2),
            vec![ScriptedResponse::text("ok")],
            ToolRegistry::new(),
        )
        .await;

        let mut seeded = Vec::new();
        for i in 0..4 {
            seeded.push(Message::user(format!("q{i}")));
            seeded.push(Message::assistant(format!("a{i}")));
        }
        h.history.seed("conv-1", seeded).await;

        collect_events(&h, "conv-1", "newest").await;

        let prompt = &h.client.calls().await[0];
        // persona + one full prior turn + the new user message
        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[1].text(), Some("q3"));
        assert_eq!(prompt[2].text(), Some("a3"));
        assert_eq!(prompt[3].text(), Some("newest"));
    }

    #[tokio::test]
    async fn test_disconnected_caller_still_persists() {
        let h = harness(
            AgentConfig::new("persona", "test-model"),
            vec![ScriptedResponse::text("nobody is listening")],
            ToolRegistry::new(),
        )
        .await;

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        h.engine.run_turn("conv-1", "hello", tx).await;

        // The assistant reply is persisted even though no one consumed it
        let log = h.history.messages("conv-1").await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].text(), Some("nobody is listening"));
    }
}
