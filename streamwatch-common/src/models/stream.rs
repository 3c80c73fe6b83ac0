use serde::{Deserialize, Serialize};

/// Result of one live-status fetch. Ephemeral: used within a single
/// reconciliation cycle to decide transitions, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub title: String,
    pub game_name: String,
    pub viewer_count: u32,
}
