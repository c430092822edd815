//! Authentication middleware for the run endpoints.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

/// Require `Authorization: Bearer <RUN_TOKEN>` on every run endpoint.
pub async fn require_run_token(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let header = match request.headers().get(AUTHORIZATION) {
        Some(header) => match header.to_str() {
            Ok(s) => s,
            Err(_) => {
                return ApiError::Unauthorized("Invalid authorization header encoding".to_string())
                    .into_response();
            }
        },
        None => {
            return ApiError::Unauthorized("Missing authorization header".to_string())
                .into_response();
        }
    };

    let token = match header.strip_prefix("Bearer ") {
        Some(t) => t,
        None => {
            return ApiError::Unauthorized(
                "Invalid authorization format, expected 'Bearer <token>'".to_string(),
            )
            .into_response();
        }
    };

    if token != state.run_token {
        tracing::debug!("Run token mismatch");
        return ApiError::Unauthorized("Invalid run token".to_string()).into_response();
    }

    next.run(request).await
}
