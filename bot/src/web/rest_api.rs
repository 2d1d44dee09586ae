use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRef, FromRequestParts, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::engine::events::GatewayEvent;
use crate::engine::tracker::TrackerStatus;

use super::app_state::AppState;

// ── Bridge auth extractor ──────────────────────────────────

/// Extractor that validates a `Authorization: Bot <token>` header against the
/// configured bot token.
pub struct BotAuth;

impl<S: Send + Sync> FromRequestParts<S> for BotAuth
where
    Arc<AppState>: FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);

        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bot ")
            .ok_or((StatusCode::UNAUTHORIZED, "Expected 'Bot <token>' format"))?;

        if !tokens_match(token, &app_state.bot_token) {
            warn!("rejected bridge request with invalid token");
            return Err((StatusCode::UNAUTHORIZED, "Invalid bot token"));
        }
        Ok(BotAuth)
    }
}

/// Compare without short-circuiting on the first differing byte.
fn tokens_match(given: &str, expected: &str) -> bool {
    let (a, b) = (given.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ── Gateway endpoints ──────────────────────────────────────

/// Apply one forwarded gateway event and return the actions for the bridge.
pub async fn post_event(
    State(state): State<Arc<AppState>>,
    _auth: BotAuth,
    Json(event): Json<GatewayEvent>,
) -> impl IntoResponse {
    debug!(kind = event.kind(), "gateway event received");
    match state.tracker.dispatch(event).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            error!(error = %e, "event dropped");
            (StatusCode::SERVICE_UNAVAILABLE, "Tracker is not running").into_response()
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracker: Option<TrackerStatus>,
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds();
    match state.tracker.status().await {
        Ok(status) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                started_at: state.started_at,
                uptime_secs,
                tracker: Some(status),
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "stopped",
                started_at: state.started_at,
                uptime_secs,
                tracker: None,
            }),
        ),
    }
}

// ── Inspection ─────────────────────────────────────────────

/// Current slot assignment of a watched guild.
pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    _auth: BotAuth,
    Path(guild_id): Path<String>,
) -> impl IntoResponse {
    match state.tracker.slots(&guild_id).await {
        Ok(Some(slots)) => Json(slots).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Guild is not being watched").into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "Tracker is not running").into_response(),
    }
}
