use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    StreamStarted,
    StreamEnded,
    RoleGranted,
    RoleRevoked,
    AnnouncementPosted,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::StreamStarted => "stream_started",
            ActivityKind::StreamEnded => "stream_ended",
            ActivityKind::RoleGranted => "role_granted",
            ActivityKind::RoleRevoked => "role_revoked",
            ActivityKind::AnnouncementPosted => "announcement_posted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stream_started" => Some(ActivityKind::StreamStarted),
            "stream_ended" => Some(ActivityKind::StreamEnded),
            "role_granted" => Some(ActivityKind::RoleGranted),
            "role_revoked" => Some(ActivityKind::RoleRevoked),
            "announcement_posted" => Some(ActivityKind::AnnouncementPosted),
            _ => None,
        }
    }
}

/// One immutable entry in the bounded activity feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub activity_id: Uuid,
    pub kind: ActivityKind,
    pub discord_user_id: String,
    pub discord_username: String,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        kind: ActivityKind,
        discord_user_id: &str,
        discord_username: &str,
        description: String,
    ) -> Self {
        Self {
            activity_id: Uuid::new_v4(),
            kind,
            discord_user_id: discord_user_id.to_string(),
            discord_username: discord_username.to_string(),
            description,
            occurred_at: Utc::now(),
        }
    }
}
