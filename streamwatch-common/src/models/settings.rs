use serde::{Deserialize, Serialize};

/// Singleton bot configuration. Re-read at the start of every cycle so an
/// operator change takes effect without a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    pub watched_role_id: String,
    pub live_role_id: String,
    pub announce_channel_id: String,
    pub check_interval_seconds: i32,
    pub is_active: bool,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            watched_role_id: String::new(),
            live_role_id: String::new(),
            announce_channel_id: String::new(),
            check_interval_seconds: 60,
            is_active: false,
        }
    }
}

/// Partial update applied through the settings endpoint; `None` fields are
/// left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotSettingsPatch {
    pub watched_role_id: Option<String>,
    pub live_role_id: Option<String>,
    pub announce_channel_id: Option<String>,
    pub check_interval_seconds: Option<i32>,
    pub is_active: Option<bool>,
}
