use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Error;
use streamwatch_common::models::{BotSettings, BotSettingsPatch};
use streamwatch_common::traits::repository_traits::BotSettingsRepository;

#[derive(Default)]
pub struct MemoryBotSettingsRepository {
    settings: RwLock<Option<BotSettings>>,
}

impl MemoryBotSettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: BotSettings) -> Self {
        Self {
            settings: RwLock::new(Some(settings)),
        }
    }
}

#[async_trait]
impl BotSettingsRepository for MemoryBotSettingsRepository {
    async fn get(&self) -> Result<Option<BotSettings>, Error> {
        Ok(self.settings.read().await.clone())
    }

    async fn update(&self, patch: &BotSettingsPatch) -> Result<BotSettings, Error> {
        let mut guard = self.settings.write().await;
        let mut current = guard.clone().unwrap_or_default();

        if let Some(v) = &patch.watched_role_id {
            current.watched_role_id = v.clone();
        }
        if let Some(v) = &patch.live_role_id {
            current.live_role_id = v.clone();
        }
        if let Some(v) = &patch.announce_channel_id {
            current.announce_channel_id = v.clone();
        }
        if let Some(v) = patch.check_interval_seconds {
            current.check_interval_seconds = v;
        }
        if let Some(v) = patch.is_active {
            current.is_active = v;
        }

        *guard = Some(current.clone());
        Ok(current)
    }
}
