//! Route handler modules.

pub mod previews;
pub mod streaming;
pub mod thumbnails;
pub mod videos;

use axum::http::HeaderMap;
use axum::Json;
use serde_json::json;

/// GET /health
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Resolve the requesting user from the `X-User` header.
///
/// Authentication is handled upstream; an absent header degrades to a
/// shared anonymous identity.
pub(crate) fn user_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-user")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}
