use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::Error;
use streamwatch_common::models::{Activity, ActivityKind};
use streamwatch_common::traits::repository_traits::{ActivityRepository, ACTIVITY_LOG_CAP};

#[derive(Clone)]
pub struct PostgresActivityRepository {
    pool: Pool<Postgres>,
}

impl PostgresActivityRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityRepository for PostgresActivityRepository {
    async fn append(&self, activity: &Activity) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO activities (
                activity_id, kind, discord_user_id, discord_username,
                description, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
            .bind(activity.activity_id)
            .bind(activity.kind.as_str())
            .bind(&activity.discord_user_id)
            .bind(&activity.discord_username)
            .bind(&activity.description)
            .bind(activity.occurred_at)
            .execute(&self.pool)
            .await?;

        // Trim everything outside the newest ACTIVITY_LOG_CAP rows.
        sqlx::query(
            r#"
            DELETE FROM activities
            WHERE activity_id NOT IN (
                SELECT activity_id
                FROM activities
                ORDER BY occurred_at DESC, activity_id DESC
                LIMIT $1
            )
            "#,
        )
            .bind(ACTIVITY_LOG_CAP as i64)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Activity>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT activity_id, kind, discord_user_id, discord_username,
                   description, occurred_at
            FROM activities
            ORDER BY occurred_at DESC, activity_id DESC
            LIMIT $1
            "#,
        )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let kind_str: String = row.try_get("kind")?;
            let kind = ActivityKind::from_str(&kind_str)
                .ok_or_else(|| Error::Parse(format!("unknown activity kind: {kind_str}")))?;
            out.push(Activity {
                activity_id: row.try_get::<Uuid, _>("activity_id")?,
                kind,
                discord_user_id: row.try_get("discord_user_id")?,
                discord_username: row.try_get("discord_username")?,
                description: row.try_get("description")?,
                occurred_at: row.try_get::<DateTime<Utc>, _>("occurred_at")?,
            });
        }
        Ok(out)
    }
}
