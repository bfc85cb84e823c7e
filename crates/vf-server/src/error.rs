//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`vf_core::Error`] so that route handlers
//! can return `Result<T, AppError>` directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
pub struct AppError {
    inner: vf_core::Error,
}

impl AppError {
    pub fn new(inner: vf_core::Error) -> Self {
        Self { inner }
    }
}

impl From<vf_core::Error> for AppError {
    fn from(e: vf_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in API handler"
            );
        }

        let code = match &self.inner {
            vf_core::Error::NotFound { .. } => "not_found",
            vf_core::Error::Validation(_) => "validation_error",
            vf_core::Error::Busy(_) => "busy",
            vf_core::Error::KeyframesUnavailable { .. } => "keyframes_unavailable",
            vf_core::Error::Encode { .. } => "encode_failed",
            vf_core::Error::InactiveTimeout => "inactive_timeout",
            vf_core::Error::Probe(_) => "probe_error",
            vf_core::Error::Tool { .. } => "tool_error",
            vf_core::Error::Database { .. } => "database_error",
            vf_core::Error::Io { .. } => "io_error",
            vf_core::Error::Internal(_) => "internal_error",
        };

        let body = json!({
            "error": self.inner.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_produces_404() {
        let err = AppError::new(vf_core::Error::not_found("video", 7));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn busy_produces_202() {
        let err = AppError::new(vf_core::Error::Busy("playlist".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn validation_produces_400() {
        let err = AppError::new(vf_core::Error::Validation("bad resolution".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
