//! HTTP handlers. Each one translates the request into a registry payload
//! and the registry result back into a response.

use super::errors::{ApiError, ApiResult};
use super::AppState;
use crate::constants::operations;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// `POST /index`: start a run and return its id as plain text
pub async fn start_index(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<String> {
    let result = state.registry.invoke(operations::INDEX, body).await?;
    let run_id = run_id_text(result)?;
    info!(run_id = %run_id, "Indexing run accepted");
    Ok(run_id)
}

/// `GET /index`: summaries of every stored run
pub async fn list_runs(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let runs = state.registry.invoke(operations::LIST, Value::Null).await?;
    Ok(Json(runs))
}

/// `GET /index/:run_id`
pub async fn run_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let run_id = Uuid::parse_str(&run_id)?;
    let checkpoint = state
        .registry
        .invoke(operations::STATUS, json!({ "run_id": run_id }))
        .await?;
    Ok(Json(checkpoint))
}

/// `POST /index/:run_id/resume`
pub async fn resume_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<String> {
    let run_id = Uuid::parse_str(&run_id)?;
    let result = state
        .registry
        .invoke(operations::RESUME, json!({ "run_id": run_id }))
        .await?;
    run_id_text(result)
}

/// `POST /index/:run_id/cancel`
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let run_id = Uuid::parse_str(&run_id)?;
    let result = state
        .registry
        .invoke(operations::CANCEL, json!({ "run_id": run_id }))
        .await?;
    Ok((StatusCode::ACCEPTED, Json(result)))
}

fn run_id_text(value: Value) -> ApiResult<String> {
    match value {
        Value::String(run_id) => Ok(run_id),
        other => Err(ApiError::Internal {
            message: format!("unexpected handler result: {other}"),
        }),
    }
}
