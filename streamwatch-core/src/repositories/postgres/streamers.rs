use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::Error;
use streamwatch_common::models::Streamer;
use streamwatch_common::traits::repository_traits::StreamerRepository;

#[derive(Clone)]
pub struct PostgresStreamerRepository {
    pool: Pool<Postgres>,
}

impl PostgresStreamerRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_streamer(row: &sqlx::postgres::PgRow) -> Result<Streamer, Error> {
    Ok(Streamer {
        streamer_id: row.try_get::<Uuid, _>("streamer_id")?,
        discord_user_id: row.try_get("discord_user_id")?,
        discord_username: row.try_get("discord_username")?,
        twitch_username: row.try_get("twitch_username")?,
        is_live: row.try_get("is_live")?,
        current_title: row.try_get("current_title")?,
        current_viewers: row.try_get("current_viewers")?,
        last_checked_at: row.try_get::<DateTime<Utc>, _>("last_checked_at")?,
        announcement_message_id: row.try_get("announcement_message_id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl StreamerRepository for PostgresStreamerRepository {
    async fn get(&self, discord_user_id: &str) -> Result<Option<Streamer>, Error> {
        let row = sqlx::query(
            r#"
            SELECT streamer_id, discord_user_id, discord_username, twitch_username,
                   is_live, current_title, current_viewers, last_checked_at,
                   announcement_message_id, created_at
            FROM streamers
            WHERE discord_user_id = $1
            "#,
        )
            .bind(discord_user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(row_to_streamer(&r)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, streamer: &Streamer) -> Result<(), Error> {
        // Single-statement upsert keyed on discord_user_id keeps the
        // per-member read-modify-write atomic.
        sqlx::query(
            r#"
            INSERT INTO streamers (
                streamer_id, discord_user_id, discord_username, twitch_username,
                is_live, current_title, current_viewers, last_checked_at,
                announcement_message_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (discord_user_id)
            DO UPDATE SET
                discord_username        = EXCLUDED.discord_username,
                twitch_username         = EXCLUDED.twitch_username,
                is_live                 = EXCLUDED.is_live,
                current_title           = EXCLUDED.current_title,
                current_viewers         = EXCLUDED.current_viewers,
                last_checked_at         = EXCLUDED.last_checked_at,
                announcement_message_id = EXCLUDED.announcement_message_id
            "#,
        )
            .bind(streamer.streamer_id)
            .bind(&streamer.discord_user_id)
            .bind(&streamer.discord_username)
            .bind(&streamer.twitch_username)
            .bind(streamer.is_live)
            .bind(&streamer.current_title)
            .bind(streamer.current_viewers)
            .bind(streamer.last_checked_at)
            .bind(&streamer.announcement_message_id)
            .bind(streamer.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Streamer>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT streamer_id, discord_user_id, discord_username, twitch_username,
                   is_live, current_title, current_viewers, last_checked_at,
                   announcement_message_id, created_at
            FROM streamers
            ORDER BY discord_username
            "#,
        )
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(row_to_streamer(&row)?);
        }
        Ok(out)
    }

    async fn delete(&self, discord_user_id: &str) -> Result<bool, Error> {
        let res = sqlx::query(
            r#"
            DELETE FROM streamers
            WHERE discord_user_id = $1
            "#,
        )
            .bind(discord_user_id)
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected() > 0)
    }
}
