//! Deterministic rules that back up the directive.
//!
//! The directive asks the model to stop retrying failing calls and to look
//! at the files before answering. Models do not always comply, so the loop
//! enforces both rules in code.

use std::collections::HashMap;

use datalyst_core::state::ConversationState;
use datalyst_core::tool::ToolCall;
use tracing::debug;

/// Reminder appended when a final answer arrives before any tool has run.
pub const TOOL_USE_REMINDER: &str = "You have not inspected any file yet. \
Use the tools on the files listed above before giving the final answer.";

/// Counts failed invocations per (tool, arguments) pair within one run and
/// blocks an identical call once it has failed `limit` times.
///
/// A limit of 0 disables the guard.
#[derive(Debug, Clone)]
pub struct RepeatedFailureGuard {
    limit: u32,
    failures: HashMap<(String, String), u32>,
}

impl RepeatedFailureGuard {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            failures: HashMap::new(),
        }
    }

    /// The error text to return instead of executing `call`, if it is blocked.
    pub fn check(&self, call: &ToolCall) -> Option<String> {
        if self.limit == 0 {
            return None;
        }
        let count = self.failures.get(&call_key(call)).copied().unwrap_or(0);
        (count >= self.limit).then(|| {
            format!(
                "ERROR: this exact call to '{}' has already failed {count} times and was not executed again. \
                 Do not retry it. Change your approach, or explain the problem to the user.",
                call.name
            )
        })
    }

    /// Record the outcome of an executed call.
    pub fn record(&mut self, call: &ToolCall, success: bool) {
        if success {
            return;
        }
        let count = self.failures.entry(call_key(call)).or_insert(0);
        *count += 1;
        debug!(tool = %call.name, failures = *count, "Recorded failed tool call");
    }
}

/// Tool name plus the arguments with object keys sorted at every level.
pub(crate) fn call_key(call: &ToolCall) -> (String, String) {
    (call.name.clone(), canonical_json(&call.arguments))
}

fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body: Vec<String> = entries
                .into_iter()
                .map(|(key, value)| {
                    format!("{}:{}", serde_json::Value::from(key.as_str()), canonical_json(value))
                })
                .collect();
            format!("{{{}}}", body.join(","))
        }
        serde_json::Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

/// Whether a final answer should be refused in favour of a tool-use reminder.
pub fn needs_tool_reminder(
    state: &ConversationState,
    require_tool_use: bool,
    reminder_sent: bool,
) -> bool {
    require_tool_use && !reminder_sent && !state.known_files.is_empty() && !state.has_tool_results()
}
