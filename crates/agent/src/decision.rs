//! Decision step: ask the backend for the next action.
//!
//! One call produces exactly one assistant message: either a final answer
//! or a non-empty list of tool requests. The step never touches the state
//! it is given.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use datalyst_core::error::AgentError;
use datalyst_core::message::Message;
use datalyst_core::provider::{Provider, ProviderRequest, ToolDefinition};
use datalyst_core::state::ConversationState;
use datalyst_core::tool::ToolCall;
use tracing::{debug, warn};

/// What the backend decided.
#[derive(Debug, Clone)]
pub struct Decision {
    /// The assistant message, with every tool request carrying an id
    pub message: Message,
    /// Parsed tool requests, in the order the model listed them
    pub tool_calls: Vec<ToolCall>,
    /// The model that answered
    pub model: String,
    /// Total tokens reported by the backend
    pub tokens_used: Option<u32>,
}

impl Decision {
    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

pub struct DecisionStep {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout: Duration,
}

impl DecisionStep {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_max_tokens(mut self, max: Option<u32>) -> Self {
        self.max_tokens = max;
        self
    }

    /// Upper bound on one backend call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Present the directive, the full history and the tool descriptors to
    /// the backend and validate what comes back.
    pub async fn decide(
        &self,
        directive: &str,
        state: &ConversationState,
        tools: &[ToolDefinition],
    ) -> Result<Decision, AgentError> {
        let mut messages = Vec::with_capacity(state.messages.len() + 1);
        messages.push(Message::system(directive));
        messages.extend(state.messages.iter().cloned());

        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: tools.to_vec(),
        };

        debug!(
            provider = self.provider.name(),
            model = %self.model,
            history = state.messages.len(),
            "Requesting decision"
        );

        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| {
                warn!(timeout_secs = self.timeout.as_secs(), "Backend call timed out");
                AgentError::BackendUnavailable(format!(
                    "no response within {}s",
                    self.timeout.as_secs()
                ))
            })??;

        let (message, tool_calls) = normalize(response.message)?;
        Ok(Decision {
            message,
            tool_calls,
            model: response.model,
            tokens_used: response.usage.map(|u| u.total_tokens),
        })
    }
}

/// Validate an assistant message and parse its tool requests.
///
/// Missing correlation ids are filled with generated `call_<uuid>` ids,
/// written back into the message so results can be correlated.
pub fn normalize(mut message: Message) -> Result<(Message, Vec<ToolCall>), AgentError> {
    if message.tool_calls.is_empty() && message.content.trim().is_empty() {
        return Err(AgentError::EmptyModelResponse);
    }

    let mut seen = HashSet::new();
    let mut calls = Vec::with_capacity(message.tool_calls.len());

    for tc in &mut message.tool_calls {
        if tc.name.trim().is_empty() {
            return Err(AgentError::MalformedModelOutput(
                "tool call with an empty name".into(),
            ));
        }
        if tc.id.trim().is_empty() {
            tc.id = format!("call_{}", uuid::Uuid::new_v4().simple());
        }
        if !seen.insert(tc.id.clone()) {
            return Err(AgentError::MalformedModelOutput(format!(
                "duplicate tool call id '{}'",
                tc.id
            )));
        }

        // Some local servers send "" for a call without arguments
        let arguments = if tc.arguments.trim().is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&tc.arguments).map_err(|e| {
                AgentError::MalformedModelOutput(format!(
                    "arguments for '{}' are not valid JSON: {e}",
                    tc.name
                ))
            })?
        };
        if !arguments.is_object() {
            return Err(AgentError::MalformedModelOutput(format!(
                "arguments for '{}' must be a JSON object",
                tc.name
            )));
        }

        calls.push(ToolCall {
            id: tc.id.clone(),
            name: tc.name.clone(),
            arguments,
        });
    }

    Ok((message, calls))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        SequentialMockProvider, make_text_response, make_tool_call, make_tool_call_response,
    };
    use datalyst_core::error::ProviderError;
    use datalyst_core::message::{MessageToolCall, Role};
    use datalyst_core::provider::ProviderResponse;
    use serde_json::json;

    fn assistant_with(calls: Vec<MessageToolCall>) -> Message {
        let mut msg = Message::assistant("");
        msg.tool_calls = calls;
        msg
    }

    fn raw_call(id: &str, name: &str, arguments: &str) -> MessageToolCall {
        MessageToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    #[test]
    fn text_answer_is_final() {
        let (message, calls) = normalize(Message::assistant("4")).unwrap();
        assert_eq!(message.content, "4");
        assert!(calls.is_empty());
    }

    #[test]
    fn empty_message_is_rejected() {
        assert_eq!(
            normalize(Message::assistant("   ")).unwrap_err(),
            AgentError::EmptyModelResponse
        );
    }

    #[test]
    fn tool_calls_are_parsed_in_order() {
        let (_, calls) = normalize(assistant_with(vec![
            raw_call("a", "file_inspector", r#"{"filePath":"x.csv"}"#),
            raw_call("b", "data_query_engine", r#"{"filePath":"x.csv","queryCode":"q"}"#),
        ]))
        .unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "file_inspector");
        assert_eq!(calls[0].arguments, json!({"filePath": "x.csv"}));
        assert_eq!(calls[1].id, "b");
    }

    #[test]
    fn missing_ids_are_generated_and_written_back() {
        let (message, calls) =
            normalize(assistant_with(vec![raw_call("", "file_inspector", "{}")])).unwrap();
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(message.tool_calls[0].id, calls[0].id);
    }

    #[test]
    fn blank_arguments_become_empty_object() {
        let (_, calls) = normalize(assistant_with(vec![raw_call("a", "t", "")])).unwrap();
        assert_eq!(calls[0].arguments, json!({}));
    }

    #[test]
    fn malformed_tool_calls_are_rejected() {
        let cases = vec![
            vec![raw_call("a", "", "{}")],
            vec![raw_call("a", "t", "{not json")],
            vec![raw_call("a", "t", "[1, 2]")],
            vec![raw_call("a", "t", "{}"), raw_call("a", "u", "{}")],
        ];
        for calls in cases {
            let err = normalize(assistant_with(calls)).unwrap_err();
            assert!(
                matches!(err, AgentError::MalformedModelOutput(_)),
                "unexpected error: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn sends_directive_history_and_tools() {
        let provider = Arc::new(SequentialMockProvider::single_text("4"));
        let step = DecisionStep::new(provider.clone(), "mock-model", 0.0);
        let state = ConversationState::seed("What is 2+2?", ["a.csv"]);
        let tools = vec![ToolDefinition {
            name: "file_inspector".into(),
            description: "inspect".into(),
            parameters: json!({"type": "object"}),
        }];

        let decision = step.decide("DIRECTIVE", &state, &tools).await.unwrap();
        assert!(decision.is_final());
        assert_eq!(decision.tokens_used, Some(15));

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        let sent = &requests[0];
        assert_eq!(sent.messages.len(), 2);
        assert_eq!(sent.messages[0].role, Role::System);
        assert_eq!(sent.messages[0].content, "DIRECTIVE");
        assert_eq!(sent.messages[1].content, "What is 2+2?");
        assert_eq!(sent.tools, tools);
        assert_eq!(sent.temperature, 0.0);
        // The step borrows the state; nothing was appended.
        assert_eq!(state.messages.len(), 1);
    }

    #[tokio::test]
    async fn returns_tool_requests() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_tool_call_response(
            vec![make_tool_call("file_inspector", json!({"filePath": "a.csv"}))],
            "",
        )]));
        let step = DecisionStep::new(provider, "mock-model", 0.0);
        let decision = step
            .decide("d", &ConversationState::seed("q", ["a.csv"]), &[])
            .await
            .unwrap();
        assert!(!decision.is_final());
        assert_eq!(decision.tool_calls[0].id, "call_file_inspector");
    }

    #[tokio::test]
    async fn backend_errors_are_unavailable() {
        let provider = Arc::new(SequentialMockProvider::failing(ProviderError::Network(
            "connection refused".into(),
        )));
        let step = DecisionStep::new(provider, "mock-model", 0.0);
        let err = step
            .decide("d", &ConversationState::seed("q", Vec::<String>::new()), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::BackendUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let provider = Arc::new(
            SequentialMockProvider::new(vec![make_text_response("late")])
                .with_delay(Duration::from_secs(30)),
        );
        let step = DecisionStep::new(provider, "mock-model", 0.0).with_timeout(Duration::from_secs(1));
        let err = step
            .decide("d", &ConversationState::seed("q", Vec::<String>::new()), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::BackendUnavailable(ref m) if m.contains("1s")));
    }

    #[tokio::test]
    async fn empty_backend_output_is_reported() {
        let provider = Arc::new(SequentialMockProvider::new(vec![ProviderResponse {
            message: Message::assistant(""),
            usage: None,
            model: "mock-model".into(),
        }]));
        let step = DecisionStep::new(provider, "mock-model", 0.0);
        let err = step
            .decide("d", &ConversationState::seed("q", Vec::<String>::new()), &[])
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::EmptyModelResponse);
    }
}
