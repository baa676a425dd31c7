//! HTTP gateway for datalyst.
//!
//! The serving variant of the agent: every `POST /v1/run` seeds a fresh
//! conversation state, runs the control loop to completion and returns the
//! answer with the accumulated messages. Nothing is kept between requests.
//!
//! Built on Axum.

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::{self, Next},
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use datalyst_agent::{AgentLoop, Transition};
use datalyst_config::AppConfig;
use datalyst_core::error::AgentError;
use datalyst_core::event::EventBus;
use datalyst_core::message::Message;

/// Request bodies above this size are rejected with 413.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub agent: Arc<AgentLoop>,
    /// When set, `/v1` routes require this bearer token
    pub bearer_token: Option<String>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - Bearer token authentication on all /v1 routes (when configured)
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let v1 = Router::new()
        .route("/tools", get(list_tools_handler))
        .route("/run", post(run_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", v1)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Provider, tools and event bus are built once and shared by every run.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = datalyst_providers::build_from_config(&config)?;
    let tools = Arc::new(datalyst_tools::default_registry(&config.tools));
    let event_bus = Arc::new(EventBus::default());
    let agent = Arc::new(AgentLoop::from_config(&config, provider, tools, event_bus));

    let state = Arc::new(GatewayState {
        agent,
        bearer_token: config.gateway.bearer_token.clone(),
    });
    let app = build_router(state);

    info!(
        addr = %addr,
        auth = config.gateway.bearer_token.is_some(),
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolDto>,
    count: usize,
}

#[derive(Serialize)]
struct ToolDto {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let defs = state.agent.tools().definitions();
    let count = defs.len();

    Json(ToolListResponse {
        tools: defs
            .into_iter()
            .map(|d| ToolDto {
                name: d.name,
                description: d.description,
                parameters: d.parameters,
            })
            .collect(),
        count,
    })
}

#[derive(Deserialize)]
struct RunRequest {
    /// The user's question.
    question: String,
    /// Files the agent may inspect.
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Serialize)]
struct RunResponse {
    run_id: String,
    answer: String,
    decisions: u32,
    dispatches: u32,
    transitions: Vec<Transition>,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

async fn run_handler(
    State(state): State<SharedState>,
    Json(payload): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    if payload.question.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "question must not be empty".into(),
                kind: "bad_request",
            }),
        ));
    }

    info!(
        question_len = payload.question.len(),
        files = payload.files.len(),
        "v1/run request"
    );

    let outcome = state
        .agent
        .run(&payload.question, payload.files)
        .await
        .map_err(|e| {
            error!(kind = e.kind(), error = %e, "Run failed");
            (
                status_for(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                    kind: e.kind(),
                }),
            )
        })?;

    Ok(Json(RunResponse {
        run_id: outcome.run_id,
        answer: outcome.answer,
        decisions: outcome.decisions,
        dispatches: outcome.dispatches,
        transitions: outcome.transitions,
        messages: outcome.state.messages,
    }))
}

/// Map a run failure to an HTTP status.
pub fn status_for(err: &AgentError) -> StatusCode {
    match err {
        AgentError::BackendUnavailable(_)
        | AgentError::MalformedModelOutput(_)
        | AgentError::EmptyModelResponse => StatusCode::BAD_GATEWAY,
        AgentError::RecursionLimitExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AgentError::UnknownTool(_)
        | AgentError::InvalidArguments { .. }
        | AgentError::ToolExecutionFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Authentication middleware for the /v1 API.
///
/// Without a configured token every request passes.
async fn auth_middleware(
    State(state): State<SharedState>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    let Some(expected) = state.bearer_token.as_deref() else {
        return Ok(next.run(req).await);
    };

    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match auth_header {
        Some(token) if token == expected => Ok(next.run(req).await),
        _ => {
            warn!("Unauthorized request to /v1 API — missing or invalid bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
