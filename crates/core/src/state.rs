//! Conversation state and its merge reducer.
//!
//! A run's state is an append-only message log plus the set of file paths
//! the agent knows about. State is never edited in place: every loop
//! transition produces a fragment (new messages, maybe new files) and the
//! loop rebuilds its state with [`merge`].

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// The accumulated state of one agent run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    /// Ordered messages. Insertion order is meaningful.
    pub messages: Vec<Message>,

    /// Known file paths. Deduplicated; order carries no meaning.
    pub known_files: BTreeSet<String>,
}

impl ConversationState {
    /// Seed a run with the user's question and the files it may inspect.
    pub fn seed<I, S>(question: impl Into<String>, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            messages: vec![Message::user(question)],
            known_files: files.into_iter().map(Into::into).collect(),
        }
    }

    /// A fragment carrying only messages.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            known_files: BTreeSet::new(),
        }
    }

    /// A fragment carrying only file references.
    pub fn from_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            messages: Vec::new(),
            known_files: files.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether any tool has answered yet in this state.
    pub fn has_tool_results(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::Tool)
    }

    /// Verify that every tool result answers exactly one unanswered request
    /// of the assistant message immediately preceding its result block.
    pub fn check_tool_correlation(&self) -> std::result::Result<(), CorrelationError> {
        let mut pending: Option<HashSet<&str>> = None;

        for (index, message) in self.messages.iter().enumerate() {
            match message.role {
                Role::Assistant => {
                    pending = Some(message.tool_calls.iter().map(|tc| tc.id.as_str()).collect());
                }
                Role::Tool => {
                    let id = message.tool_call_id.as_deref().unwrap_or_default();
                    let answered = pending.as_mut().is_some_and(|open| open.remove(id));
                    if !answered {
                        return Err(CorrelationError {
                            index,
                            tool_call_id: id.to_string(),
                        });
                    }
                }
                Role::User | Role::System => pending = None,
            }
        }

        Ok(())
    }
}

/// A tool-result message that does not answer an open request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("orphaned tool result at message {index} (tool_call_id '{tool_call_id}')")]
pub struct CorrelationError {
    pub index: usize,
    pub tool_call_id: String,
}

/// Merge an incoming state fragment into an existing state.
///
/// Messages are concatenated, incoming after existing. Known files are
/// unioned: `merge({a,b}, {b,c})` knows exactly `{a,b,c}`. Neither input is
/// modified.
pub fn merge(existing: &ConversationState, incoming: &ConversationState) -> ConversationState {
    let mut messages = Vec::with_capacity(existing.messages.len() + incoming.messages.len());
    messages.extend(existing.messages.iter().cloned());
    messages.extend(incoming.messages.iter().cloned());

    ConversationState {
        messages,
        known_files: existing
            .known_files
            .union(&incoming.known_files)
            .cloned()
            .collect(),
    }
}
