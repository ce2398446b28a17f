// SPDX-License-Identifier: MIT OR Apache-2.0
//! Converts [`ErrorInfo`] into an HTTP response per the error taxonomy's
//! `http_status` mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rb_core::ErrorInfo;
use serde_json::json;

/// Thin wrapper so [`ErrorInfo`] can be returned directly from a handler.
pub struct ApiError(pub ErrorInfo);

impl From<ErrorInfo> for ApiError {
    fn from(value: ErrorInfo) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "error": {
                "code": self.0.code.code(),
                "message": self.0.message,
                "context": self.0.context,
            }
        }));
        (status, body).into_response()
    }
}
