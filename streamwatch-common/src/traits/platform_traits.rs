use async_trait::async_trait;

use crate::error::Error;
use crate::models::{GuildMemberInfo, StreamSnapshot};

/// Chat-platform membership and messaging primitives consumed by the
/// reconciliation engine.
///
/// `grant_role` / `revoke_role` must be idempotent: granting an
/// already-held role or revoking an absent one succeeds as a no-op.
#[async_trait]
pub trait RoleChannelGateway: Send + Sync {
    /// Fails if the role cannot be resolved; that aborts the cycle.
    async fn list_members_with_role(&self, role_id: &str) -> Result<Vec<GuildMemberInfo>, Error>;
    async fn grant_role(&self, user_id: &str, role_id: &str) -> Result<(), Error>;
    async fn revoke_role(&self, user_id: &str, role_id: &str) -> Result<(), Error>;
    /// Returns the posted message id.
    async fn post_message(&self, channel_id: &str, content: &str) -> Result<String, Error>;
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), Error>;
    /// Best-effort inference of a member's Twitch login from presence
    /// metadata. `Ok(None)` simply means nothing resolvable right now.
    async fn resolve_twitch_handle(&self, user_id: &str) -> Result<Option<String>, Error>;
}

/// Live-status lookup against the streaming platform. Pure query;
/// `Ok(None)` means the channel is offline. Rate limiting and backoff
/// belong to the implementation, not the engine.
#[async_trait]
pub trait StreamStatusProvider: Send + Sync {
    async fn fetch_stream(&self, twitch_login: &str) -> Result<Option<StreamSnapshot>, Error>;
}
