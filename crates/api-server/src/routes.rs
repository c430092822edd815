//! Router assembly.

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, runs};
use crate::middleware::require_run_token;
use crate::state::AppState;

/// Build the application router: an open health check plus the
/// token-protected run triggers.
pub fn create_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/v1/runs/scoring-drain", post(runs::scoring_drain))
        .route("/v1/runs/auto-entry", post(runs::auto_entry))
        .route("/v1/runs/reconcile", post(runs::reconcile))
        .route_layer(from_fn_with_state(state.clone(), require_run_token));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
