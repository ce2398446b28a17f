// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod dto;
mod error;
mod handlers;
mod middleware;
mod sse;
mod state;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

/// Build the Axum router serving the `/api/*` surface over `state`.
#[must_use]
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/session", get(handlers::session))
        .route("/api/file", get(handlers::file))
        .route("/api/tree", get(handlers::tree))
        .route("/api/boilerplate/config", post(handlers::boilerplate_config))
        .route("/api/boilerplate/render", post(handlers::boilerplate_render))
        .route("/api/boilerplate/render-inline", post(handlers::boilerplate_render_inline))
        .route("/api/executables", get(handlers::executables))
        .route("/api/workspace/changes", get(handlers::workspace_changes))
        .route("/api/exec", post(sse::exec))
        .route("/api/exec/cancel", post(sse::exec_cancel))
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware))
        .layer(from_fn(middleware::request_logger_middleware))
        .layer(from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
