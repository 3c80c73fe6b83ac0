use async_trait::async_trait;

use crate::error::Error;
use crate::models::{Activity, BotSettings, BotSettingsPatch, Streamer};

/// CRUD over tracked-member records, keyed by Discord user id.
///
/// Implementations must make the read-modify-write of a single member
/// atomic with respect to concurrent per-member updates.
#[async_trait]
pub trait StreamerRepository: Send + Sync {
    async fn get(&self, discord_user_id: &str) -> Result<Option<Streamer>, Error>;
    async fn upsert(&self, streamer: &Streamer) -> Result<(), Error>;
    async fn list(&self) -> Result<Vec<Streamer>, Error>;
    /// Administrative removal; the engine itself never deletes records.
    async fn delete(&self, discord_user_id: &str) -> Result<bool, Error>;
}

#[async_trait]
pub trait BotSettingsRepository: Send + Sync {
    /// `None` until an operator has configured the bot at least once.
    async fn get(&self) -> Result<Option<BotSettings>, Error>;
    async fn update(&self, patch: &BotSettingsPatch) -> Result<BotSettings, Error>;
}

/// Append-only activity feed, bounded to the newest
/// [`ACTIVITY_LOG_CAP`] entries (oldest evicted first).
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn append(&self, activity: &Activity) -> Result<(), Error>;
    /// Most recent first.
    async fn recent(&self, limit: i64) -> Result<Vec<Activity>, Error>;
}

/// Retention cap shared by all `ActivityRepository` backends.
pub const ACTIVITY_LOG_CAP: usize = 1000;
