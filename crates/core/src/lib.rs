//! # datalyst Core
//!
//! Domain types, traits, and error definitions for the datalyst analyst agent.
//! This crate has **no framework dependencies**: it defines the domain model
//! that the provider, tool, agent and gateway crates implement against.
//!
//! ## Design Philosophy
//!
//! The reasoning backend and every tool are traits here. Implementations live
//! in their respective crates. This enables:
//! - Swapping the backend via configuration
//! - Scripted backends and stub tools in tests
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod state;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{AgentError, Error, ProviderError, Result, ToolError};
pub use event::{AgentEvent, EventBus};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use state::{ConversationState, merge};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
