use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde_json::json;
use tracing::warn;

use crate::server::server::AppState;
use crate::utils::constants::API_KEY_HEADER;

const BAD_API_KEY: &str = "bad api key";

/// Constant-time string comparison.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Rejects requests whose `Api-Key` header does not match the configured key.
pub async fn require_api_key(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let authorized = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|key| constant_time_eq(key, &state.api_key));

    if !authorized {
        warn!(path = req.uri().path(), "rejected request with bad api key");
        return (StatusCode::FORBIDDEN, Json(json!({ "error": BAD_API_KEY }))).into_response();
    }
    next.run(req).await
}
