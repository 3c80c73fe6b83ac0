use serde::{Deserialize, Serialize};

/// A guild member as enumerated from the watched role. IDs are Discord
/// snowflakes kept as strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildMemberInfo {
    pub user_id: String,
    pub display_name: String,
}
