//! Dispatch step: execute the requested tool invocations.
//!
//! Produces one tool-result message per request, in request order,
//! correlated by id. Failures at the tool boundary (unknown name, schema
//! violation, panic, timeout) become error results the model can read,
//! unless strict mode turns the first two into run failures.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use datalyst_core::error::{AgentError, ToolError};
use datalyst_core::message::{META_ERROR_KIND, META_IS_ERROR, META_TOOL_NAME, Message};
use datalyst_core::tool::{ToolCall, ToolRegistry, ToolResult, validate_arguments};
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::policy::{RepeatedFailureGuard, call_key};

/// Error kind recorded when the failure guard refused a call.
pub const REPEATED_FAILURE_KIND: &str = "repeated_failure";

/// One executed (or refused) invocation.
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    /// The correlated tool-result message
    pub message: Message,
    pub tool_name: String,
    pub success: bool,
    pub duration_ms: u64,
}

enum Outcome {
    Completed(ToolResult),
    Failed(AgentError),
    Refused(String),
}

pub struct Dispatcher {
    tools: Arc<ToolRegistry>,
    timeout: Duration,
    parallel: bool,
    strict: bool,
}

impl Dispatcher {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            timeout: Duration::from_secs(60),
            parallel: false,
            strict: false,
        }
    }

    /// Upper bound on one tool invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the invocations of one turn concurrently.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Abort on unknown tools and invalid arguments.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Execute every call and return one record per call, same order.
    pub async fn dispatch(
        &self,
        calls: &[ToolCall],
        guard: &mut RepeatedFailureGuard,
    ) -> Result<Vec<DispatchRecord>, AgentError> {
        debug!(count = calls.len(), parallel = self.parallel, "Dispatching tool calls");

        let timed: Vec<(Outcome, u64)> = if self.parallel {
            // Identical calls share a group and run in order inside it, so
            // the guard refuses repeats exactly as in sequential mode.
            let groups = group_identical(calls);
            let snapshot = guard.clone();
            let runs = groups.iter().map(|members| {
                let mut local = snapshot.clone();
                async move {
                    let mut done = Vec::with_capacity(members.len());
                    for &index in members {
                        let call = &calls[index];
                        let entry = match local.check(call) {
                            Some(text) => (Outcome::Refused(text), 0),
                            None => self.invoke_timed(call).await,
                        };
                        if let Some(success) = entry.0.executed_success() {
                            local.record(call, success);
                        }
                        done.push((index, entry));
                    }
                    done
                }
            });
            let mut finished: Vec<(usize, (Outcome, u64))> =
                futures::future::join_all(runs).await.into_iter().flatten().collect();
            finished.sort_by_key(|(index, _)| *index);
            for (index, (outcome, _)) in &finished {
                if let Some(success) = outcome.executed_success() {
                    guard.record(&calls[*index], success);
                }
            }
            finished.into_iter().map(|(_, entry)| entry).collect()
        } else {
            let mut timed = Vec::with_capacity(calls.len());
            for call in calls {
                let entry = match guard.check(call) {
                    Some(text) => (Outcome::Refused(text), 0),
                    None => self.invoke_timed(call).await,
                };
                if let Some(success) = entry.0.executed_success() {
                    guard.record(call, success);
                }
                timed.push(entry);
            }
            timed
        };

        calls
            .iter()
            .zip(timed)
            .map(|(call, (outcome, duration_ms))| self.record(call, outcome, duration_ms))
            .collect()
    }

    async fn invoke_timed(&self, call: &ToolCall) -> (Outcome, u64) {
        let start = Instant::now();
        let outcome = match self.invoke(call).await {
            Ok(result) => Outcome::Completed(result),
            Err(e) => Outcome::Failed(e),
        };
        (outcome, start.elapsed().as_millis() as u64)
    }

    async fn invoke(&self, call: &ToolCall) -> Result<ToolResult, AgentError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| AgentError::UnknownTool(call.name.clone()))?;
        validate_arguments(tool.name(), &tool.parameters_schema(), &call.arguments)?;

        let guarded = AssertUnwindSafe(tool.execute(call.arguments.clone())).catch_unwind();
        match tokio::time::timeout(self.timeout, guarded).await {
            Err(_) => Err(ToolError::Timeout {
                tool_name: call.name.clone(),
                timeout_secs: self.timeout.as_secs(),
            }
            .into()),
            Ok(Err(_)) => Err(AgentError::ToolExecutionFailed {
                tool_name: call.name.clone(),
                reason: "the tool panicked".into(),
            }),
            Ok(Ok(result)) => Ok(result?),
        }
    }

    fn record(
        &self,
        call: &ToolCall,
        outcome: Outcome,
        duration_ms: u64,
    ) -> Result<DispatchRecord, AgentError> {
        let (content, success, error_kind) = match outcome {
            Outcome::Completed(result) => {
                info!(tool = %call.name, success = result.success, duration_ms, "Tool executed");
                (result.output, result.success, None)
            }
            Outcome::Refused(text) => {
                warn!(tool = %call.name, "Refused repeated failing call");
                (text, false, Some(REPEATED_FAILURE_KIND))
            }
            Outcome::Failed(err) => {
                if self.strict
                    && matches!(
                        err,
                        AgentError::UnknownTool(_) | AgentError::InvalidArguments { .. }
                    )
                {
                    return Err(err);
                }
                warn!(tool = %call.name, error = %err, "Tool dispatch failed");
                (self.render_failure(&err), false, Some(err.kind()))
            }
        };

        let mut message = Message::tool_result(&call.id, content)
            .with_metadata(META_TOOL_NAME, call.name.as_str())
            .with_metadata(META_IS_ERROR, !success);
        if let Some(kind) = error_kind {
            message = message.with_metadata(META_ERROR_KIND, kind);
        }

        Ok(DispatchRecord {
            message,
            tool_name: call.name.clone(),
            success,
            duration_ms,
        })
    }

    fn render_failure(&self, err: &AgentError) -> String {
        match err {
            AgentError::UnknownTool(_) => format!(
                "Error: {err}. Available tools: {}",
                self.tools.names().join(", ")
            ),
            _ => format!("Error: {err}"),
        }
    }
}

/// Indices of `calls`, grouped by (tool, arguments), in first-seen order.
fn group_identical(calls: &[ToolCall]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut seen: HashMap<(String, String), usize> = HashMap::new();
    for (index, call) in calls.iter().enumerate() {
        let key = call_key(call);
        match seen.get(&key) {
            Some(&group) => groups[group].push(index),
            None => {
                seen.insert(key, groups.len());
                groups.push(vec![index]);
            }
        }
    }
    groups
}

impl Outcome {
    /// `Some(success)` when the tool actually ran.
    fn executed_success(&self) -> Option<bool> {
        match self {
            Outcome::Completed(result) => Some(result.success),
            Outcome::Failed(_) => Some(false),
            Outcome::Refused(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{EchoTool, FailingTool, PanickingTool};
    use serde_json::json;

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool::new("echo")));
        registry.register(Box::new(EchoTool::slow("slow_echo", Duration::from_millis(80))));
        registry.register(Box::new(EchoTool::slow("sleepy", Duration::from_secs(10))));
        registry.register(Box::new(FailingTool));
        registry.register(Box::new(PanickingTool));
        Arc::new(registry)
    }

    fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    fn guard() -> RepeatedFailureGuard {
        RepeatedFailureGuard::new(2)
    }

    #[tokio::test]
    async fn one_result_per_call_in_order() {
        let dispatcher = Dispatcher::new(registry());
        let calls = vec![
            call("c1", "echo", json!({"text": "one"})),
            call("c2", "echo", json!({"text": "two"})),
        ];
        let records = dispatcher.dispatch(&calls, &mut guard()).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(records[0].message.content, "echo: one");
        assert_eq!(records[1].message.tool_call_id.as_deref(), Some("c2"));
        assert_eq!(records[1].message.tool_name(), Some("echo"));
        assert!(!records[1].message.is_error());
    }

    #[tokio::test]
    async fn parallel_dispatch_keeps_request_order() {
        let dispatcher = Dispatcher::new(registry()).with_parallel(true);
        let calls = vec![
            call("slow", "slow_echo", json!({"text": "first"})),
            call("fast", "echo", json!({"text": "second"})),
        ];
        let records = dispatcher.dispatch(&calls, &mut guard()).await.unwrap();

        assert_eq!(records[0].message.tool_call_id.as_deref(), Some("slow"));
        assert_eq!(records[0].message.content, "slow_echo: first");
        assert_eq!(records[1].message.tool_call_id.as_deref(), Some("fast"));
    }

    #[tokio::test]
    async fn empty_call_list_produces_nothing() {
        let dispatcher = Dispatcher::new(registry());
        assert!(dispatcher.dispatch(&[], &mut guard()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_result() {
        let dispatcher = Dispatcher::new(registry());
        let records = dispatcher
            .dispatch(&[call("c1", "sql_runner", json!({}))], &mut guard())
            .await
            .unwrap();

        let message = &records[0].message;
        assert!(message.is_error());
        assert_eq!(message.metadata[META_ERROR_KIND], "unknown_tool");
        assert!(message.content.contains("Unknown tool: sql_runner"));
        assert!(message.content.contains("Available tools: echo"));
    }

    #[tokio::test]
    async fn strict_mode_aborts_on_unknown_tool() {
        let dispatcher = Dispatcher::new(registry()).with_strict(true);
        let err = dispatcher
            .dispatch(&[call("c1", "sql_runner", json!({}))], &mut guard())
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::UnknownTool("sql_runner".into()));
    }

    #[tokio::test]
    async fn invalid_arguments_are_reported() {
        let dispatcher = Dispatcher::new(registry());
        let records = dispatcher
            .dispatch(&[call("c1", "echo", json!({"text": 7}))], &mut guard())
            .await
            .unwrap();
        assert_eq!(records[0].message.metadata[META_ERROR_KIND], "invalid_arguments");

        let strict = Dispatcher::new(registry()).with_strict(true);
        let err = strict
            .dispatch(&[call("c1", "echo", json!({}))], &mut guard())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments { ref tool_name, .. } if tool_name == "echo"));
    }

    #[tokio::test]
    async fn panics_are_contained() {
        let dispatcher = Dispatcher::new(registry()).with_strict(true);
        let records = dispatcher
            .dispatch(&[call("c1", "panicking", json!({}))], &mut guard())
            .await
            .unwrap();
        assert_eq!(records[0].message.metadata[META_ERROR_KIND], "tool_execution_failed");
        assert!(records[0].message.content.contains("panicked"));
    }

    #[tokio::test]
    async fn slow_tools_time_out() {
        let dispatcher = Dispatcher::new(registry()).with_timeout(Duration::from_millis(50));
        let records = dispatcher
            .dispatch(&[call("c1", "sleepy", json!({"text": "zz"}))], &mut guard())
            .await
            .unwrap();
        assert!(!records[0].success);
        assert_eq!(records[0].message.metadata[META_ERROR_KIND], "tool_execution_failed");
        assert!(records[0].message.content.contains("timed out"));
    }

    #[tokio::test]
    async fn tool_error_results_are_flagged() {
        let dispatcher = Dispatcher::new(registry());
        let records = dispatcher
            .dispatch(&[call("c1", "failing", json!({}))], &mut guard())
            .await
            .unwrap();
        assert!(records[0].message.is_error());
        assert!(!records[0].message.metadata.contains_key(META_ERROR_KIND));
        assert_eq!(records[0].message.content, "ERROR IN QUERY: nothing works");
    }

    #[tokio::test]
    async fn repeated_failures_are_refused() {
        let dispatcher = Dispatcher::new(registry());
        let mut guard = guard();
        let failing = call("c1", "failing", json!({"q": 1}));

        for _ in 0..2 {
            let records = dispatcher.dispatch(&[failing.clone()], &mut guard).await.unwrap();
            assert!(!records[0].message.metadata.contains_key(META_ERROR_KIND));
        }
        let records = dispatcher.dispatch(&[failing], &mut guard).await.unwrap();
        assert_eq!(records[0].message.metadata[META_ERROR_KIND], REPEATED_FAILURE_KIND);
        assert!(records[0].message.content.contains("Do not retry"));
    }

    #[tokio::test]
    async fn repeated_failures_within_one_turn_are_refused() {
        let failing = call("c", "failing", json!({}));
        let calls: Vec<ToolCall> = (1..=3)
            .map(|i| ToolCall {
                id: format!("c{i}"),
                ..failing.clone()
            })
            .collect();

        for parallel in [false, true] {
            let dispatcher = Dispatcher::new(registry()).with_parallel(parallel);
            let records = dispatcher.dispatch(&calls, &mut guard()).await.unwrap();
            assert_eq!(records.len(), 3);
            for executed in &records[..2] {
                assert!(!executed.success, "parallel={parallel}");
                assert_eq!(executed.message.content, "ERROR IN QUERY: nothing works");
                assert!(!executed.message.metadata.contains_key(META_ERROR_KIND));
            }
            assert_eq!(
                records[2].message.metadata[META_ERROR_KIND],
                REPEATED_FAILURE_KIND,
                "parallel={parallel}"
            );
            assert_eq!(records[2].message.tool_call_id.as_deref(), Some("c3"));
        }
    }

    #[tokio::test]
    async fn parallel_refusals_carry_over_to_the_next_turn() {
        let dispatcher = Dispatcher::new(registry()).with_parallel(true);
        let mut guard = guard();
        let failing = call("c1", "failing", json!({}));
        let first = [failing.clone(), call("c2", "echo", json!({"text": "hola"})), ToolCall {
            id: "c3".into(),
            ..failing.clone()
        }];

        let records = dispatcher.dispatch(&first, &mut guard).await.unwrap();
        assert!(records[1].success);
        assert!(!records[2].success);
        assert_eq!(records[2].message.content, "ERROR IN QUERY: nothing works");

        let records = dispatcher
            .dispatch(&[ToolCall { id: "c4".into(), ..failing }], &mut guard)
            .await
            .unwrap();
        assert_eq!(records[0].message.metadata[META_ERROR_KIND], REPEATED_FAILURE_KIND);
    }
}
