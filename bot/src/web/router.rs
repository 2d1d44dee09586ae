use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;

use super::app_state::AppState;
use super::rest_api;

/// Largest event body the bridge may send. A `ready` payload for a large
/// guild is the biggest message we expect.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the axum router for the gateway bridge.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/gateway/events", post(rest_api::post_event))
        .route("/gateway/health", get(rest_api::health))
        .route("/groups/{guild_id}/slots", get(rest_api::get_slots))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
