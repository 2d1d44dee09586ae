use chrono::{DateTime, Utc};

use crate::engine::tracker::TrackerHandle;

/// Shared state for the bridge endpoints.
pub struct AppState {
    pub tracker: TrackerHandle,
    /// Secret the gateway bridge presents as `Authorization: Bot <token>`.
    pub bot_token: String,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(tracker: TrackerHandle, bot_token: impl Into<String>) -> Self {
        Self {
            tracker,
            bot_token: bot_token.into(),
            started_at: Utc::now(),
        }
    }
}
