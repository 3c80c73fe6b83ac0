use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use crate::Error;
use streamwatch_common::models::{BotSettings, BotSettingsPatch};
use streamwatch_common::traits::repository_traits::BotSettingsRepository;

/// Singleton settings row (id = 1).
#[derive(Clone)]
pub struct PostgresBotSettingsRepository {
    pool: Pool<Postgres>,
}

impl PostgresBotSettingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_settings(row: &sqlx::postgres::PgRow) -> Result<BotSettings, Error> {
    Ok(BotSettings {
        watched_role_id: row.try_get("watched_role_id")?,
        live_role_id: row.try_get("live_role_id")?,
        announce_channel_id: row.try_get("announce_channel_id")?,
        check_interval_seconds: row.try_get("check_interval_seconds")?,
        is_active: row.try_get("is_active")?,
    })
}

#[async_trait]
impl BotSettingsRepository for PostgresBotSettingsRepository {
    async fn get(&self) -> Result<Option<BotSettings>, Error> {
        let row = sqlx::query(
            r#"
            SELECT watched_role_id, live_role_id, announce_channel_id,
                   check_interval_seconds, is_active
            FROM bot_settings
            WHERE id = 1
            "#,
        )
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(row_to_settings(&r)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, patch: &BotSettingsPatch) -> Result<BotSettings, Error> {
        // COALESCE keeps existing values for fields the patch leaves unset;
        // a first-time update falls back to the column defaults.
        let row = sqlx::query(
            r#"
            INSERT INTO bot_settings (
                id, watched_role_id, live_role_id, announce_channel_id,
                check_interval_seconds, is_active
            )
            VALUES (
                1,
                COALESCE($1, ''),
                COALESCE($2, ''),
                COALESCE($3, ''),
                COALESCE($4, 60),
                COALESCE($5, FALSE)
            )
            ON CONFLICT (id)
            DO UPDATE SET
                watched_role_id        = COALESCE($1, bot_settings.watched_role_id),
                live_role_id           = COALESCE($2, bot_settings.live_role_id),
                announce_channel_id    = COALESCE($3, bot_settings.announce_channel_id),
                check_interval_seconds = COALESCE($4, bot_settings.check_interval_seconds),
                is_active              = COALESCE($5, bot_settings.is_active)
            RETURNING watched_role_id, live_role_id, announce_channel_id,
                      check_interval_seconds, is_active
            "#,
        )
            .bind(&patch.watched_role_id)
            .bind(&patch.live_role_id)
            .bind(&patch.announce_channel_id)
            .bind(patch.check_interval_seconds)
            .bind(patch.is_active)
            .fetch_one(&self.pool)
            .await?;

        row_to_settings(&row)
    }
}
