//! Dashboard HTTP surface: thin reads/writes over the stores plus the
//! manual refresh trigger. No reconciliation logic lives here.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::warn;

use streamwatch_common::models::{Activity, BotSettings, BotSettingsPatch, Streamer};
use streamwatch_common::traits::repository_traits::{
    ActivityRepository, BotSettingsRepository, StreamerRepository,
};
use streamwatch_common::Error;
use streamwatch_core::services::{CycleOutcome, DashboardStats, ReconciliationEngine, StatsService};

pub struct AppState {
    pub engine: Arc<ReconciliationEngine>,
    pub streamers: Arc<dyn StreamerRepository>,
    pub settings: Arc<dyn BotSettingsRepository>,
    pub activity: Arc<dyn ActivityRepository>,
    pub stats: StatsService,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/stats", get(get_stats))
        .route("/api/streamers", get(get_streamers))
        .route("/api/activity", get(get_activity))
        .route("/api/bot-settings", get(get_settings).post(update_settings))
        .route("/api/refresh", post(manual_refresh))
        .with_state(state)
}

fn internal(e: Error) -> (StatusCode, String) {
    warn!("Dashboard request failed: {e}");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardStats>, (StatusCode, String)> {
    state.stats.snapshot().await.map(Json).map_err(internal)
}

async fn get_streamers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Streamer>>, (StatusCode, String)> {
    state.streamers.list().await.map(Json).map_err(internal)
}

#[derive(Debug, Deserialize)]
struct ActivityQuery {
    limit: Option<i64>,
}

async fn get_activity(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<Activity>>, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(50).clamp(1, 1000);
    state
        .activity
        .recent(limit)
        .await
        .map(Json)
        .map_err(internal)
}

async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<BotSettings>>, (StatusCode, String)> {
    state.settings.get().await.map(Json).map_err(internal)
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<BotSettingsPatch>,
) -> Result<Json<BotSettings>, (StatusCode, String)> {
    if let Some(interval) = patch.check_interval_seconds {
        if interval <= 0 {
            return Err((
                StatusCode::BAD_REQUEST,
                "check_interval_seconds must be > 0".to_string(),
            ));
        }
    }
    state.settings.update(&patch).await.map(Json).map_err(internal)
}

/// "Refresh now": runs a cycle immediately. If one is already in flight
/// the trigger is coalesced and reported as such.
async fn manual_refresh(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CycleOutcome>, (StatusCode, String)> {
    state.engine.run_cycle().await.map(Json).map_err(internal)
}
