use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Json, Router};
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::server::auth::require_api_key;
use crate::server::server::AppState;
use crate::utils::constants::{DEFAULT_PROVIDER, TOKENS_PATH};

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub provider: Option<String>,
}

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(TOKENS_PATH, get(get_token))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
}

async fn get_token(State(state): State<AppState>, Query(query): Query<TokenQuery>) -> Response {
    let provider = query
        .provider
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_owned());

    match state.broker.token(&provider).await {
        Ok(token) => {
            debug!(provider = %provider, "token served");
            (StatusCode::OK, Json(json!({ "token": token }))).into_response()
        }
        Err(e) => {
            let status = e.status_code();
            warn!(provider = %provider, status = status.as_u16(), error = %e, "token request failed");
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}
