// SPDX-License-Identifier: MIT OR Apache-2.0
//! Middleware stack for the `/api` surface: request ids, structured
//! request logging, and bearer-token authentication.

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

use crate::state::AppState;

/// A unique request identifier, available as an Axum extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub Uuid);

/// Generates a [`RequestId`] per request and sets the `X-Request-Id`
/// response header.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    req.extensions_mut().insert(id);
    let mut resp = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id.0.to_string()) {
        resp.headers_mut().insert("x-request-id", value);
    }
    resp
}

/// Logs method, path, status, and duration for each request.
pub async fn request_logger_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let resp = next.run(req).await;

    info!(
        http.method = %method,
        http.path = %path,
        http.status = resp.status().as_u16(),
        http.duration_ms = start.elapsed().as_millis() as u64,
        "request completed"
    );

    resp
}

/// Rejects requests missing a matching `Authorization: Bearer <token>`
/// header when the session has a configured token. A `None` token means
/// the session is unauthenticated by choice (loopback-only use).
pub async fn auth_middleware(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let Some(expected) = state.config.auth_token.as_deref() else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => next.run(req).await,
        _ => (StatusCode::UNAUTHORIZED, "missing or invalid bearer token").into_response(),
    }
}
