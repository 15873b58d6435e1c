// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local HTTP control surface.
//!
//! A thin axum shell over [`cortex_engine::Control`]. Binds to loopback
//! only; there is no auth layer here.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cortex_engine::{Control, ControlError};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub control: Arc<Control>,
}

pub fn router(control: Arc<Control>) -> Router {
    Router::new()
        .route("/scheduler/status", get(scheduler_status))
        .route("/scheduler/pause", post(scheduler_pause))
        .route("/scheduler/resume", post(scheduler_resume))
        .route("/status", get(status_summary))
        .route("/health", get(health))
        .route("/dispatches/{work_item_id}", get(dispatch_history))
        .route("/dispatches/{id}/cancel", post(cancel_dispatch))
        .route("/dispatches/{id}/retry", post(retry_dispatch))
        .with_state(AppState { control })
}

/// Control errors mapped onto HTTP statuses.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        let status = match &err {
            ControlError::NotFound(_) => StatusCode::NOT_FOUND,
            ControlError::NotTerminal { .. } | ControlError::ProviderGone(_) => {
                StatusCode::CONFLICT
            }
            ControlError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn scheduler_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let (run_state, updated_at) = state.control.scheduler_state()?;
    Ok(Json(json!({
        "state": run_state.as_str(),
        "updated_at": updated_at,
    })))
}

async fn scheduler_pause(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.control.pause()?;
    Ok(Json(json!({})))
}

async fn scheduler_resume(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.control.resume()?;
    Ok(Json(json!({})))
}

async fn status_summary(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let summary = state.control.status_summary()?;
    Ok(Json(json!({
        "running_count": summary.running_count,
        "recent_failures": summary.recent_failures,
        "weekly_usage_pct": summary.weekly_usage_pct,
    })))
}

async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let snapshot = state.control.health()?;
    Ok(Json(json!({
        "healthy": snapshot.healthy,
        "events": snapshot.events,
    })))
}

async fn dispatch_history(
    State(state): State<AppState>,
    Path(work_item_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let history = state.control.dispatch_history(&work_item_id)?;
    Ok(Json(json!({ "dispatches": history })))
}

async fn cancel_dispatch(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.control.cancel(id).await?;
    Ok(Json(json!({})))
}

async fn retry_dispatch(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let new_id = state.control.retry(id).await?;
    Ok(Json(json!({ "new_id": new_id })))
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
