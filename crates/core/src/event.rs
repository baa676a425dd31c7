//! Agent event system: observe runs without coupling to the loop.
//!
//! The control loop publishes an event at every transition. Frontends
//! (the CLI in verbose mode, tests) subscribe and filter for what they
//! care about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All events emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentEvent {
    /// A run was seeded and entered `Deciding`
    RunStarted {
        run_id: String,
        known_files: usize,
        timestamp: DateTime<Utc>,
    },

    /// The decision step produced an assistant message
    DecisionMade {
        run_id: String,
        iteration: u32,
        tool_requests: usize,
        model: String,
        tokens_used: Option<u32>,
        timestamp: DateTime<Utc>,
    },

    /// One tool invocation was dispatched
    ToolDispatched {
        run_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The run reached `Done`
    RunFinished {
        run_id: String,
        decisions: u32,
        dispatches: u32,
        timestamp: DateTime<Utc>,
    },

    /// The run failed
    RunFailed {
        run_id: String,
        error_kind: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for agent events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<AgentEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: AgentEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AgentEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
