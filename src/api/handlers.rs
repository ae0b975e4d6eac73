// src/api/handlers.rs

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::error::AuctionError;
use crate::model::request::AuctionRequest;
use crate::AppState;

/// **处理 auction 请求**
///
/// - 200：至少一个 imp 有 winner（或带 debug trace）
/// - 204：没有任何 winner
/// - 400：tmax 不足以覆盖预留开销
/// - 500：内部不变量被破坏
pub async fn handle_auction(State(state): State<Arc<AppState>>, Json(request): Json<AuctionRequest>) -> Response {
    match state.engine.run_auction(request).await {
        Ok(response) if response.bids.is_empty() && response.debug.is_none() => StatusCode::NO_CONTENT.into_response(),
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e @ AuctionError::InvalidTimeout { .. }) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(e) => {
            error!(error = %e, "auction failed on an internal invariant");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal error" }))).into_response()
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new().route("/auction", post(handle_auction)).with_state(state)
}
