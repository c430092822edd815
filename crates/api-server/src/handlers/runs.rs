//! Run-trigger handlers.
//!
//! Every invocation returns the structured `RunResult`, HTTP 200 for all
//! expected conditions (nothing to do, already running, market closed) and
//! HTTP 500 only for fatal aborts, still carrying the structured body —
//! periodic triggers can treat "skipped" and "succeeded" uniformly and alert
//! on real failures only.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use entry_engine::EntryOptions;
use reconciler::ReconcileOptions;
use scoring_drain::DrainOptions;
use tradeloop_core::types::RunResult;

use crate::state::AppState;

/// Options accepted by every run endpoint; all fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRequest {
    pub limit: Option<usize>,
    pub budget_ms: Option<u64>,
    /// Oldest-first backlog ordering (scoring drain only).
    #[serde(default)]
    pub backlog: bool,
    pub release_limit: Option<usize>,
    #[serde(default)]
    pub dry_run: bool,
}

fn run_response(result: RunResult) -> Response {
    let status = if result.ok {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(result)).into_response()
}

pub async fn scoring_drain(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RunRequest>>,
) -> Response {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let result = state
        .drain
        .run(DrainOptions {
            limit: req.limit,
            budget_ms: req.budget_ms,
            backlog: req.backlog,
            release_limit: req.release_limit,
            dry_run: req.dry_run,
        })
        .await;
    run_response(result)
}

pub async fn auto_entry(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RunRequest>>,
) -> Response {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let result = state
        .entry
        .run(EntryOptions {
            limit: req.limit,
            budget_ms: req.budget_ms,
            dry_run: req.dry_run,
        })
        .await;
    run_response(result)
}

pub async fn reconcile(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RunRequest>>,
) -> Response {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let result = state
        .reconciler
        .run(ReconcileOptions {
            limit: req.limit,
            budget_ms: req.budget_ms,
            dry_run: req.dry_run,
        })
        .await;
    run_response(result)
}
