use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use twilight_cache_inmemory::{InMemoryCache, ResourceType};
use twilight_gateway::{
    self as gateway, CloseFrame, Config, Event, EventTypeFlags, Intents, MessageSender, Shard,
    StreamExt,
};
use twilight_http::client::ClientBuilder;
use twilight_http::Client as HttpClient;
use twilight_model::gateway::payload::incoming::Ready as ReadyPayload;
use twilight_model::gateway::presence::ActivityType;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker, RoleMarker, UserMarker};
use twilight_model::id::Id;

use crate::Error;
use streamwatch_common::models::GuildMemberInfo;
use streamwatch_common::traits::platform_traits::RoleChannelGateway;

/// The shard runner keeps the in-memory cache current; presence data from
/// the cache is what drives Twitch-handle inference.
async fn shard_runner(mut shard: Shard, cache: Arc<InMemoryCache>) {
    let shard_id = shard.id().number();
    info!("(ShardRunner) Shard {shard_id} started. Listening for events.");

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        match item {
            Ok(event) => {
                cache.update(&event);

                match &event {
                    Event::Ready(ready) => {
                        let data: &ReadyPayload = ready.as_ref();
                        info!(
                            "Shard {shard_id} => READY as {} (ID={})",
                            data.user.name, data.user.id
                        );
                    }
                    _ => {
                        trace!("Shard {shard_id} => event: {:?}", event.kind());
                    }
                }
            }
            Err(err) => {
                error!("Shard {shard_id} => error receiving event: {err:?}");
            }
        }
    }

    warn!("(ShardRunner) Shard {shard_id} event loop ended.");
}

/// Discord side of the system: gateway connection, role membership,
/// announcement messaging, and presence-based handle inference for one
/// guild.
pub struct DiscordPlatform {
    token: String,
    guild_id: Id<GuildMarker>,

    shard_tasks: Vec<JoinHandle<()>>,
    shard_senders: Vec<MessageSender>,

    http: Option<Arc<HttpClient>>,
    cache: Option<Arc<InMemoryCache>>,
}

impl DiscordPlatform {
    pub fn new(token: String, guild_id: u64) -> Self {
        Self {
            token,
            guild_id: Id::<GuildMarker>::new(guild_id),
            shard_tasks: Vec::new(),
            shard_senders: Vec::new(),
            http: None,
            cache: None,
        }
    }

    /// Validates the token shape and brings up HTTP + gateway shards.
    /// Errors here are fatal startup errors.
    pub async fn connect(&mut self) -> Result<(), Error> {
        if self.token.is_empty() {
            return Err(Error::Auth("Discord token is empty".into()));
        }
        if self.http.is_some() {
            info!("(DiscordPlatform) Already connected => skipping");
            return Ok(());
        }

        let http_client = Arc::new(
            ClientBuilder::new()
                .token(self.token.clone())
                .timeout(Duration::from_secs(30))
                .build(),
        );

        // Verify the token before spawning shards so a bad credential
        // fails loudly at startup.
        let me = http_client
            .current_user()
            .await
            .map_err(|e| Error::Auth(format!("Discord token rejected: {e:?}")))?
            .model()
            .await
            .map_err(|e| Error::Auth(format!("Discord identity parse error: {e:?}")))?;
        info!("(DiscordPlatform) Authenticated as {} (ID={})", me.name, me.id);

        let cache = Arc::new(
            InMemoryCache::builder()
                .resource_types(
                    ResourceType::GUILD
                        | ResourceType::MEMBER
                        | ResourceType::ROLE
                        | ResourceType::PRESENCE,
                )
                .build(),
        );

        let config = Config::new(
            self.token.clone(),
            Intents::GUILDS | Intents::GUILD_MEMBERS | Intents::GUILD_PRESENCES,
        );

        let shards = gateway::create_recommended(&http_client, config, |_, b| b.build())
            .await
            .map_err(|e| Error::Platform(format!("create_recommended error: {e}")))?;

        for shard in shards {
            self.shard_senders.push(shard.sender());
            let cache_for_shard = cache.clone();
            self.shard_tasks
                .push(tokio::spawn(
                    async move { shard_runner(shard, cache_for_shard).await },
                ));
        }

        self.http = Some(http_client);
        self.cache = Some(cache);
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<(), Error> {
        for sender in &self.shard_senders {
            let _ = sender.close(CloseFrame::NORMAL);
        }
        for task in &mut self.shard_tasks {
            let _ = task.await;
        }
        self.shard_senders.clear();
        self.shard_tasks.clear();
        self.http = None;
        self.cache = None;
        Ok(())
    }

    fn http(&self) -> Result<&Arc<HttpClient>, Error> {
        self.http
            .as_ref()
            .ok_or_else(|| Error::Platform("Discord HTTP client not connected".into()))
    }

    fn cache(&self) -> Result<&Arc<InMemoryCache>, Error> {
        self.cache
            .as_ref()
            .ok_or_else(|| Error::Platform("Discord cache not available".into()))
    }
}

fn parse_id<M>(raw: &str, what: &str) -> Result<Id<M>, Error> {
    let value: u64 = raw
        .parse()
        .map_err(|_| Error::Config(format!("invalid {what} ID: {raw:?}")))?;
    if value == 0 {
        return Err(Error::Config(format!("invalid {what} ID: {raw:?}")));
    }
    Ok(Id::<M>::new(value))
}

/// A watched-role id that parses as a snowflake but does not exist in the
/// guild means the bot is misconfigured. Surfacing that as a config error
/// lets the cycle abort instead of reporting an empty roster.
fn ensure_role_defined(
    mut defined: impl Iterator<Item = Id<RoleMarker>>,
    role_id: Id<RoleMarker>,
) -> Result<(), Error> {
    if defined.any(|id| id == role_id) {
        Ok(())
    } else {
        Err(Error::Config(format!("role {role_id} not found in guild")))
    }
}

/// Extracts a Twitch login from a URL like "https://twitch.tv/somelogin".
pub(crate) fn twitch_login_from_url(url: &str) -> Option<String> {
    let idx = url.find("twitch.tv/")?;
    let rest = &url[idx + "twitch.tv/".len()..];
    let login: String = rest
        .chars()
        .take_while(|c| *c != '/' && *c != '?')
        .collect();
    if login.is_empty() {
        None
    } else {
        Some(login.to_lowercase())
    }
}

#[async_trait]
impl RoleChannelGateway for DiscordPlatform {
    async fn list_members_with_role(&self, role_id: &str) -> Result<Vec<GuildMemberInfo>, Error> {
        let role_id = parse_id::<RoleMarker>(role_id, "role")?;
        let http = self.http()?;

        // A role id that parses but is not defined in the guild is a
        // configuration error, not an empty roster.
        let guild_roles = http
            .roles(self.guild_id)
            .await
            .map_err(|e| Error::Platform(format!("guild roles fetch error: {e:?}")))?
            .models()
            .await
            .map_err(|e| Error::Platform(format!("guild roles parse error: {e:?}")))?;
        ensure_role_defined(guild_roles.iter().map(|r| r.id), role_id)?;

        let members = http
            .guild_members(self.guild_id)
            .limit(1000)
            .await
            .map_err(|e| Error::Platform(format!("guild_members fetch error: {e:?}")))?
            .models()
            .await
            .map_err(|e| Error::Platform(format!("guild_members parse error: {e:?}")))?;

        let holders: Vec<GuildMemberInfo> = members
            .into_iter()
            .filter(|m| m.roles.contains(&role_id))
            .map(|m| GuildMemberInfo {
                user_id: m.user.id.to_string(),
                display_name: m.nick.unwrap_or_else(|| m.user.name.clone()),
            })
            .collect();

        debug!(
            "Found {} members holding role {} in guild {}",
            holders.len(),
            role_id,
            self.guild_id
        );
        Ok(holders)
    }

    async fn grant_role(&self, user_id: &str, role_id: &str) -> Result<(), Error> {
        let user_id = parse_id::<UserMarker>(user_id, "user")?;
        let role_id = parse_id::<RoleMarker>(role_id, "role")?;

        // Discord treats adding an already-held role as a no-op, which is
        // exactly the idempotence the engine relies on.
        self.http()?
            .add_guild_member_role(self.guild_id, user_id, role_id)
            .await
            .map_err(|e| Error::Platform(format!("add_guild_member_role error: {e:?}")))?;
        Ok(())
    }

    async fn revoke_role(&self, user_id: &str, role_id: &str) -> Result<(), Error> {
        let user_id = parse_id::<UserMarker>(user_id, "user")?;
        let role_id = parse_id::<RoleMarker>(role_id, "role")?;

        self.http()?
            .remove_guild_member_role(self.guild_id, user_id, role_id)
            .await
            .map_err(|e| Error::Platform(format!("remove_guild_member_role error: {e:?}")))?;
        Ok(())
    }

    async fn post_message(&self, channel_id: &str, content: &str) -> Result<String, Error> {
        let channel_id = parse_id::<ChannelMarker>(channel_id, "channel")?;

        let message = self
            .http()?
            .create_message(channel_id)
            .content(content)
            .await
            .map_err(|e| Error::Platform(format!("create_message error: {e:?}")))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("create_message parse error: {e:?}")))?;

        Ok(message.id.to_string())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), Error> {
        let channel_id = parse_id::<ChannelMarker>(channel_id, "channel")?;
        let message_id = parse_id::<MessageMarker>(message_id, "message")?;

        self.http()?
            .delete_message(channel_id, message_id)
            .await
            .map_err(|e| Error::Platform(format!("delete_message error: {e:?}")))?;
        Ok(())
    }

    async fn resolve_twitch_handle(&self, user_id: &str) -> Result<Option<String>, Error> {
        let user_id = parse_id::<UserMarker>(user_id, "user")?;
        let cache = self.cache()?;

        let Some(presence) = cache.presence(self.guild_id, user_id) else {
            debug!("No presence cached for user {user_id}");
            return Ok(None);
        };

        for activity in presence.activities() {
            if activity.kind != ActivityType::Streaming {
                continue;
            }
            if let Some(url) = &activity.url {
                if let Some(login) = twitch_login_from_url(url) {
                    debug!("Resolved Twitch login {login:?} for user {user_id} from activity URL");
                    return Ok(Some(login));
                }
            }
            // Some clients put "twitch.tv/<login>" in the state field.
            if let Some(state) = &activity.state {
                if let Some(login) = twitch_login_from_url(state) {
                    debug!("Resolved Twitch login {login:?} for user {user_id} from activity state");
                    return Ok(Some(login));
                }
            }
        }

        Ok(None)
    }
}
