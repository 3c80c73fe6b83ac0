use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One guild member under observation. Keyed by `discord_user_id`;
/// `streamer_id` is the stable row identity.
///
/// Invariants maintained by the reconciliation engine:
/// - `announcement_message_id` is `Some` only while `is_live` is true.
/// - `current_title` is `None` and `current_viewers` is 0 while not live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Streamer {
    pub streamer_id: Uuid,
    pub discord_user_id: String,
    pub discord_username: String,
    /// Twitch login, if one could be inferred. `None` means the member is
    /// tracked but dormant: no status fetches until this resolves.
    pub twitch_username: Option<String>,
    pub is_live: bool,
    pub current_title: Option<String>,
    pub current_viewers: i32,
    pub last_checked_at: DateTime<Utc>,
    pub announcement_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Streamer {
    pub fn new(
        discord_user_id: String,
        discord_username: String,
        twitch_username: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            streamer_id: Uuid::new_v4(),
            discord_user_id,
            discord_username,
            twitch_username,
            is_live: false,
            current_title: None,
            current_viewers: 0,
            last_checked_at: now,
            announcement_message_id: None,
            created_at: now,
        }
    }
}
