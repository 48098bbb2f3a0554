//! The bounded think/act loop.

use crate::agent::{AgentDeps, AgentProfile, CardContext, build_system_prompt};
use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::llm::{AssistantMessage, CompletionRequest, DeltaSink, Message, ToolCall, ToolResult};
use crate::tools::ToolDispatcher;

/// Input for one turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_key: String,
    /// User message or inbound event description.
    pub message: String,
    /// Prior history for the session, oldest first.
    pub history: Vec<Message>,
    pub card: Option<CardContext>,
}

impl TurnRequest {
    pub fn new(session_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
            message: message.into(),
            history: Vec::new(),
            card: None,
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_card(mut self, card: Option<CardContext>) -> Self {
        self.card = card;
        self
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Text of the last assistant message; empty if it only called tools.
    pub text: String,
    /// Prior history plus everything produced this turn. The caller persists it.
    pub history: Vec<Message>,
    pub tool_call_count: usize,
    /// Model calls made.
    pub iterations: usize,
}

/// Runs agent turns: call the model, dispatch requested tools, feed results
/// back, until the model stops or the iteration cap is hit.
///
/// The engine holds no per-session state. Callers are responsible for
/// serializing turns of one session and for bounding concurrency.
pub struct AgentTurnEngine {
    deps: AgentDeps,
    default_model: String,
    max_iterations: usize,
}

impl AgentTurnEngine {
    pub fn new(deps: AgentDeps, config: &Config) -> Self {
        Self {
            deps,
            default_model: config.model.clone(),
            max_iterations: config.max_iterations.max(1),
        }
    }

    pub fn deps(&self) -> &AgentDeps {
        &self.deps
    }

    /// Run a turn. Only a model call failure is returned as an error; tool
    /// failures are handed back to the model as error results.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnOutcome> {
        self.run(request, None).await
    }

    /// Run a turn, forwarding assistant text fragments to `sink` as they arrive.
    pub async fn run_turn_streaming(
        &self,
        request: TurnRequest,
        sink: &DeltaSink,
    ) -> Result<TurnOutcome> {
        self.run(request, Some(sink)).await
    }

    #[tracing::instrument(
        skip(self, request, sink),
        fields(session_key = %request.session_key, history_len = request.history.len())
    )]
    async fn run(&self, request: TurnRequest, sink: Option<&DeltaSink>) -> Result<TurnOutcome> {
        let (model, system_prompt) = self.prepare(request.card.as_ref()).await;
        let dispatcher = ToolDispatcher::new(
            self.deps.cards.clone(),
            self.deps.memory.clone(),
            request.card,
        );
        let tools = dispatcher.definitions().await;

        let mut messages = request.history;
        messages.push(Message::user(request.message));

        let mut tool_call_count = 0;
        let mut iterations = 0;
        let mut finished = false;

        while iterations < self.max_iterations {
            iterations += 1;
            let completion = CompletionRequest {
                model: &model,
                system_prompt: &system_prompt,
                messages: &messages,
                tools: &tools,
            };
            let response = match sink {
                Some(sink) => self.deps.model.complete_streaming(completion, sink).await,
                None => self.deps.model.complete(completion).await,
            }
            .map_err(|source| AgentError::ModelCall {
                model: model.clone(),
                source,
            })?;

            let calls: Vec<ToolCall> = response.tool_calls().cloned().collect();
            let wants_tools = response.wants_tools();
            messages.push(Message::Assistant(response));

            if !wants_tools || calls.is_empty() {
                // Calls in a final response are never run, but saved history
                // must still answer every call.
                for call in &calls {
                    tracing::debug!(tool_name = %call.name, "tool call in final response left undispatched");
                    messages.push(Message::ToolResult(ToolResult::error(
                        call,
                        format!("Tool not executed: {} arrived in a final response", call.name),
                    )));
                }
                finished = true;
                break;
            }

            for call in &calls {
                tool_call_count += 1;
                tracing::debug!(iteration = iterations, tool_name = %call.name, "dispatching tool call");
                let result = dispatcher.dispatch(call).await;
                messages.push(Message::ToolResult(result));
            }
        }

        if !finished {
            tracing::warn!(
                max_iterations = self.max_iterations,
                tool_call_count,
                "turn stopped at the iteration cap"
            );
        }

        let text = messages
            .iter()
            .rev()
            .find_map(Message::as_assistant)
            .map(AssistantMessage::text)
            .unwrap_or_default();

        tracing::info!(iterations, tool_call_count, "agent turn finished");

        Ok(TurnOutcome {
            text,
            history: messages,
            tool_call_count,
            iterations,
        })
    }

    /// Resolve the model and system prompt. Unreadable memory degrades to an
    /// empty prompt rather than failing the turn.
    async fn prepare(&self, card: Option<&CardContext>) -> (String, String) {
        let sources = match self.deps.memory.load_prompt_sources().await {
            Ok(sources) => sources,
            Err(error) => {
                tracing::warn!(%error, "failed to load prompt sources, continuing without them");
                Default::default()
            }
        };
        let profile = sources
            .agent_profile
            .as_deref()
            .map(AgentProfile::parse)
            .unwrap_or_default();
        let model = profile
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        (model, build_system_prompt(&profile, &sources, card))
    }
}
