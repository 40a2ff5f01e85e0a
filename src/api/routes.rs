//! API route definitions and handlers.

use super::error::ApiError;
use super::state::AppState;
use super::types::{
    CancelExecutionResponse, ExecutionListResponse, HealthResponse, StartExecutionRequest,
    StartExecutionResponse, TemplateInfo, TemplateListResponse,
};
use crate::registry::StartRequest;
use crate::templates::ScriptTemplate;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/templates", get(list_templates))
        .route("/executions", get(list_executions).post(start_execution))
        .route("/executions/{identifier}/cancel", post(cancel_execution))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        executor: state.registry.executor_label(),
        uptime_secs: state.uptime_secs(),
    })
}

async fn list_templates() -> Json<TemplateListResponse> {
    let templates = ScriptTemplate::ALL
        .iter()
        .map(|t| TemplateInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
        })
        .collect();
    Json(TemplateListResponse { templates })
}

async fn list_executions(State(state): State<AppState>) -> Json<ExecutionListResponse> {
    let executions = state.registry.snapshot().await;
    let total = executions.len();
    Json(ExecutionListResponse { executions, total })
}

async fn start_execution(
    State(state): State<AppState>,
    Json(request): Json<StartExecutionRequest>,
) -> Result<(StatusCode, Json<StartExecutionResponse>), ApiError> {
    let source = request.source()?;
    let handle = state
        .registry
        .start(StartRequest {
            context_id: request.context_id,
            source,
            duration_ms: request.duration_ms,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(handle.into())))
}

async fn cancel_execution(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<CancelExecutionResponse>, ApiError> {
    let outcome = state.registry.cancel(&identifier).await?;
    Ok(Json(outcome.into()))
}
