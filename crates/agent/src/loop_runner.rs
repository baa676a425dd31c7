//! The control loop: a two-state machine alternating Decision and Dispatch.
//!
//! ```text
//! Deciding --(tool requests)--> Dispatching --(always)--> Deciding
//! Deciding --(no tool requests)--> Done
//! ```
//!
//! Every transition merges the messages it produced into the run's state
//! before the next phase runs. The recursion ceiling bounds the number of
//! times `Deciding` is entered.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use datalyst_config::AppConfig;
use datalyst_core::error::AgentError;
use datalyst_core::event::{AgentEvent, EventBus};
use datalyst_core::message::Message;
use datalyst_core::provider::Provider;
use datalyst_core::state::{ConversationState, merge};
use datalyst_core::tool::{ToolCall, ToolRegistry};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::decision::DecisionStep;
use crate::directive::Directive;
use crate::dispatch::Dispatcher;
use crate::policy::{self, RepeatedFailureGuard};

/// Loop phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Deciding,
    Dispatching,
    Done,
}

/// One edge taken by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
}

/// The result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    /// Content of the final assistant message
    pub answer: String,
    /// Everything the run accumulated
    pub state: ConversationState,
    /// Times `Deciding` was entered
    pub decisions: u32,
    /// Times `Dispatching` was entered
    pub dispatches: u32,
    /// Ordered trace of the transitions taken
    pub transitions: Vec<Transition>,
}

/// Orchestrates the decision and dispatch steps for one run at a time.
pub struct AgentLoop {
    decision: DecisionStep,
    dispatcher: Dispatcher,
    tools: Arc<ToolRegistry>,
    directive: Directive,
    recursion_limit: u32,
    require_tool_use: bool,
    max_identical_failures: u32,
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    /// Create a new agent loop with default limits.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            decision: DecisionStep::new(provider, model, temperature),
            dispatcher: Dispatcher::new(tools.clone()),
            tools,
            directive: Directive::default(),
            recursion_limit: 25,
            require_tool_use: false,
            max_identical_failures: 2,
            event_bus,
        }
    }

    /// Build a loop from the `provider`, `agent` and `tools` config sections.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::new(
            provider,
            config.provider.model.clone(),
            config.provider.temperature,
            tools,
            event_bus,
        )
        .with_max_tokens(config.provider.max_tokens)
        .with_provider_timeout(Duration::from_secs(config.provider.timeout_secs))
        .with_tool_timeout(Duration::from_secs(config.tools.timeout_secs))
        .with_recursion_limit(config.agent.recursion_limit)
        .with_parallel_tool_calls(config.agent.parallel_tool_calls)
        .with_strict_dispatch(config.agent.strict_dispatch)
        .with_require_tool_use(config.agent.require_tool_use)
        .with_max_identical_failures(config.agent.max_identical_failures)
        .with_directive(Directive::new(config.agent.directive_override.clone()))
    }

    /// Set the maximum number of decision steps per run.
    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_max_tokens(mut self, max: Option<u32>) -> Self {
        self.decision = self.decision.with_max_tokens(max);
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.decision = self.decision.with_timeout(timeout);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.dispatcher = self.dispatcher.with_timeout(timeout);
        self
    }

    pub fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.dispatcher = self.dispatcher.with_parallel(enabled);
        self
    }

    pub fn with_strict_dispatch(mut self, enabled: bool) -> Self {
        self.dispatcher = self.dispatcher.with_strict(enabled);
        self
    }

    /// Refuse a final answer until a tool has run (one reminder per run).
    pub fn with_require_tool_use(mut self, enabled: bool) -> Self {
        self.require_tool_use = enabled;
        self
    }

    pub fn with_max_identical_failures(mut self, limit: u32) -> Self {
        self.max_identical_failures = limit;
        self
    }

    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directive = directive;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer a question, offering the given files to the model.
    pub async fn run<I, S>(&self, question: &str, files: I) -> Result<RunOutcome, AgentError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run_state(ConversationState::seed(question, files)).await
    }

    /// Drive the state machine from an initial state until `Done` or failure.
    pub async fn run_state(&self, initial: ConversationState) -> Result<RunOutcome, AgentError> {
        let run_id = uuid::Uuid::new_v4().to_string();

        info!(
            run_id = %run_id,
            known_files = initial.known_files.len(),
            recursion_limit = self.recursion_limit,
            "Starting run"
        );
        self.event_bus.publish(AgentEvent::RunStarted {
            run_id: run_id.clone(),
            known_files: initial.known_files.len(),
            timestamp: Utc::now(),
        });

        match self.drive(&run_id, initial).await {
            Ok(outcome) => {
                info!(
                    run_id = %run_id,
                    decisions = outcome.decisions,
                    dispatches = outcome.dispatches,
                    "Run finished"
                );
                self.event_bus.publish(AgentEvent::RunFinished {
                    run_id,
                    decisions: outcome.decisions,
                    dispatches: outcome.dispatches,
                    timestamp: Utc::now(),
                });
                Ok(outcome)
            }
            Err(e) => {
                warn!(run_id = %run_id, kind = e.kind(), error = %e, "Run failed");
                self.event_bus.publish(AgentEvent::RunFailed {
                    run_id,
                    error_kind: e.kind().to_string(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    async fn drive(&self, run_id: &str, initial: ConversationState) -> Result<RunOutcome, AgentError> {
        let definitions = self.tools.definitions();
        let mut guard = RepeatedFailureGuard::new(self.max_identical_failures);

        let mut state = initial;
        let mut phase = Phase::Deciding;
        let mut transitions = Vec::new();
        let mut pending: Vec<ToolCall> = Vec::new();
        let mut decisions = 0u32;
        let mut dispatches = 0u32;
        let mut reminder_sent = false;
        let mut answer = String::new();

        while phase != Phase::Done {
            let next = match phase {
                Phase::Deciding => {
                    if decisions >= self.recursion_limit {
                        return Err(AgentError::RecursionLimitExceeded {
                            limit: self.recursion_limit,
                        });
                    }
                    decisions += 1;

                    let directive = self.directive.render(&state.known_files);
                    let decision = self.decision.decide(&directive, &state, &definitions).await?;

                    debug!(
                        run_id,
                        iteration = decisions,
                        tool_requests = decision.tool_calls.len(),
                        "Decision made"
                    );
                    self.event_bus.publish(AgentEvent::DecisionMade {
                        run_id: run_id.to_string(),
                        iteration: decisions,
                        tool_requests: decision.tool_calls.len(),
                        model: decision.model.clone(),
                        tokens_used: decision.tokens_used,
                        timestamp: Utc::now(),
                    });

                    let is_final = decision.is_final();
                    let content = decision.message.content.clone();
                    state = merge(
                        &state,
                        &ConversationState::from_messages(vec![decision.message]),
                    );

                    if !is_final {
                        pending = decision.tool_calls;
                        Phase::Dispatching
                    } else if policy::needs_tool_reminder(&state, self.require_tool_use, reminder_sent) {
                        debug!(run_id, "Final answer before any tool use, sending reminder");
                        reminder_sent = true;
                        state = merge(
                            &state,
                            &ConversationState::from_messages(vec![Message::user(
                                policy::TOOL_USE_REMINDER,
                            )]),
                        );
                        Phase::Deciding
                    } else {
                        answer = content;
                        Phase::Done
                    }
                }
                Phase::Dispatching => {
                    dispatches += 1;
                    let calls = std::mem::take(&mut pending);
                    let records = self.dispatcher.dispatch(&calls, &mut guard).await?;

                    let mut produced = Vec::with_capacity(records.len());
                    for record in records {
                        self.event_bus.publish(AgentEvent::ToolDispatched {
                            run_id: run_id.to_string(),
                            tool_name: record.tool_name,
                            success: record.success,
                            duration_ms: record.duration_ms,
                            timestamp: Utc::now(),
                        });
                        produced.push(record.message);
                    }
                    state = merge(&state, &ConversationState::from_messages(produced));
                    Phase::Deciding
                }
                Phase::Done => break,
            };

            transitions.push(Transition { from: phase, to: next });
            phase = next;
        }

        Ok(RunOutcome {
            run_id: run_id.to_string(),
            answer,
            state,
            decisions,
            dispatches,
            transitions,
        })
    }
}
