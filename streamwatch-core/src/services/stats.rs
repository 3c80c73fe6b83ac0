//! Dashboard aggregates: thin reads over the stores, no reconciliation
//! logic.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::Error;
use streamwatch_common::models::ActivityKind;
use streamwatch_common::traits::repository_traits::{
    ActivityRepository, BotSettingsRepository, StreamerRepository, ACTIVITY_LOG_CAP,
};

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub active_streams: usize,
    pub tracked_streamers: usize,
    pub announcements_today: usize,
    pub uptime_seconds: i64,
    pub online: bool,
}

pub struct StatsService {
    streamers: Arc<dyn StreamerRepository>,
    settings: Arc<dyn BotSettingsRepository>,
    activity: Arc<dyn ActivityRepository>,
    started_at: DateTime<Utc>,
}

impl StatsService {
    pub fn new(
        streamers: Arc<dyn StreamerRepository>,
        settings: Arc<dyn BotSettingsRepository>,
        activity: Arc<dyn ActivityRepository>,
    ) -> Self {
        Self {
            streamers,
            settings,
            activity,
            started_at: Utc::now(),
        }
    }

    pub async fn snapshot(&self) -> Result<DashboardStats, Error> {
        let roster = self.streamers.list().await?;
        let active_streams = roster.iter().filter(|s| s.is_live).count();

        let today = Utc::now().date_naive();
        let announcements_today = self
            .activity
            .recent(ACTIVITY_LOG_CAP as i64)
            .await?
            .iter()
            .filter(|a| {
                a.kind == ActivityKind::StreamStarted && a.occurred_at.date_naive() == today
            })
            .count();

        let online = self
            .settings
            .get()
            .await?
            .map(|s| s.is_active)
            .unwrap_or(false);

        Ok(DashboardStats {
            active_streams,
            tracked_streamers: roster.len(),
            announcements_today,
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
            online,
        })
    }
}
