//! Error types for the datalyst domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`AgentError`] is the
//! taxonomy a run surfaces to its caller.

use thiserror::Error;

/// The top-level error type for the command-line entry points.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Agent run errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- I/O ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // --- Generic ---
    #[error("{0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the reasoning backend.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Provider returned no message")]
    EmptyResponse,
}

/// Failures at the tool boundary.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },
}

/// The ways a single agent run can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("Reasoning backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Malformed model output: {0}")]
    MalformedModelOutput(String),

    #[error("The model returned an empty response")]
    EmptyModelResponse,

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for tool {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool {tool_name} failed: {reason}")]
    ToolExecutionFailed { tool_name: String, reason: String },

    #[error("Recursion limit of {limit} decision steps exceeded")]
    RecursionLimitExceeded { limit: u32 },
}

impl AgentError {
    /// Stable snake_case identifier, used in tool-result metadata and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::BackendUnavailable(_) => "backend_unavailable",
            AgentError::MalformedModelOutput(_) => "malformed_model_output",
            AgentError::EmptyModelResponse => "empty_model_response",
            AgentError::UnknownTool(_) => "unknown_tool",
            AgentError::InvalidArguments { .. } => "invalid_arguments",
            AgentError::ToolExecutionFailed { .. } => "tool_execution_failed",
            AgentError::RecursionLimitExceeded { .. } => "recursion_limit_exceeded",
        }
    }
}

impl From<ProviderError> for AgentError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::MalformedResponse(reason) => AgentError::MalformedModelOutput(reason),
            ProviderError::EmptyResponse => AgentError::EmptyModelResponse,
            other => AgentError::BackendUnavailable(other.to_string()),
        }
    }
}

impl From<ToolError> for AgentError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::NotFound(name) => AgentError::UnknownTool(name),
            ToolError::InvalidArguments { tool_name, reason } => {
                AgentError::InvalidArguments { tool_name, reason }
            }
            ToolError::ExecutionFailed { tool_name, reason } => {
                AgentError::ToolExecutionFailed { tool_name, reason }
            }
            ToolError::Timeout {
                tool_name,
                timeout_secs,
            } => AgentError::ToolExecutionFailed {
                tool_name,
                reason: format!("timed out after {timeout_secs}s"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 503,
            message: "model is loading".into(),
        });
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("model is loading"));
    }

    #[test]
    fn provider_errors_map_to_agent_kinds() {
        let network: AgentError = ProviderError::Network("connection refused".into()).into();
        assert!(matches!(network, AgentError::BackendUnavailable(_)));

        let timeout: AgentError = ProviderError::Timeout("120s".into()).into();
        assert!(matches!(timeout, AgentError::BackendUnavailable(_)));

        let malformed: AgentError = ProviderError::MalformedResponse("bad json".into()).into();
        assert_eq!(malformed, AgentError::MalformedModelOutput("bad json".into()));

        let empty: AgentError = ProviderError::EmptyResponse.into();
        assert_eq!(empty, AgentError::EmptyModelResponse);
    }

    #[test]
    fn tool_errors_map_to_agent_kinds() {
        let unknown: AgentError = ToolError::NotFound("sql".into()).into();
        assert_eq!(unknown, AgentError::UnknownTool("sql".into()));

        let timeout: AgentError = ToolError::Timeout {
            tool_name: "file_inspector".into(),
            timeout_secs: 30,
        }
        .into();
        assert_eq!(timeout.kind(), "tool_execution_failed");
        assert!(timeout.to_string().contains("30s"));
    }

    #[test]
    fn run_failures_lift_into_top_level_error() {
        fn run() -> Result<()> {
            Err(AgentError::RecursionLimitExceeded { limit: 3 })?
        }
        let err = run().unwrap_err();
        assert!(matches!(err, Error::Agent(AgentError::RecursionLimitExceeded { limit: 3 })));
        assert!(err.to_string().starts_with("Agent error:"));

        let io: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(io.to_string().contains("gone"));
    }

    #[test]
    fn recursion_limit_displays_limit() {
        let err = AgentError::RecursionLimitExceeded { limit: 25 };
        assert!(err.to_string().contains("25"));
        assert_eq!(err.kind(), "recursion_limit_exceeded");
    }
}
