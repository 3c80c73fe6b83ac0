//! The stream-state reconciliation engine.
//!
//! One cycle enumerates the watched-role members, classifies each against
//! the qualifying criteria, diffs against the recorded state and drives
//! the role/announcement side effects. Cycles are single-flight: a
//! trigger arriving while one is running is coalesced, never run
//! concurrently.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::Error;
use streamwatch_common::models::{
    Activity, ActivityKind, BotSettings, GuildMemberInfo, StreamSnapshot, Streamer,
};
use streamwatch_common::traits::platform_traits::{RoleChannelGateway, StreamStatusProvider};
use streamwatch_common::traits::repository_traits::{
    ActivityRepository, BotSettingsRepository, StreamerRepository,
};

/// Deployment-fixed qualification criteria: a stream counts only when it
/// is live in this game with the keyword somewhere in the title.
#[derive(Debug, Clone)]
pub struct QualifyFilter {
    game_name: String,
    title_keyword: String,
}

impl QualifyFilter {
    pub fn new(game_name: &str, title_keyword: &str) -> Self {
        Self {
            game_name: game_name.to_string(),
            title_keyword: title_keyword.to_lowercase(),
        }
    }

    /// Exact game match, case-insensitive substring match on the title.
    pub fn matches(&self, snapshot: &StreamSnapshot) -> bool {
        snapshot.game_name == self.game_name
            && snapshot.title.to_lowercase().contains(&self.title_keyword)
    }
}

/// Per-cycle counters, for operator reporting only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleResult {
    pub started: usize,
    pub ended: usize,
    pub refreshed: usize,
    pub idle: usize,
    pub dormant: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed(CycleResult),
    /// Settings missing or `is_active` false; nothing to do.
    Inactive,
    /// Another cycle was in flight; this trigger was coalesced.
    AlreadyRunning,
}

enum MemberOutcome {
    Started,
    Ended,
    Refreshed,
    Idle,
    Dormant,
}

pub struct ReconciliationEngine {
    streamers: Arc<dyn StreamerRepository>,
    settings: Arc<dyn BotSettingsRepository>,
    activity: Arc<dyn ActivityRepository>,
    gateway: Arc<dyn RoleChannelGateway>,
    provider: Arc<dyn StreamStatusProvider>,
    filter: QualifyFilter,
    cycle_lock: Mutex<()>,
}

impl ReconciliationEngine {
    pub fn new(
        streamers: Arc<dyn StreamerRepository>,
        settings: Arc<dyn BotSettingsRepository>,
        activity: Arc<dyn ActivityRepository>,
        gateway: Arc<dyn RoleChannelGateway>,
        provider: Arc<dyn StreamStatusProvider>,
        filter: QualifyFilter,
    ) -> Self {
        Self {
            streamers,
            settings,
            activity,
            gateway,
            provider,
            filter,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Runs one reconciliation cycle. Invoked by the periodic monitor
    /// task and by the manual refresh endpoint; both share the
    /// single-flight guard.
    ///
    /// The only abort condition is failing to enumerate the watched-role
    /// membership; per-member failures are isolated and counted.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, Error> {
        let _guard = match self.cycle_lock.try_lock() {
            Ok(g) => g,
            Err(_) => {
                debug!("Cycle already in flight; coalescing trigger");
                return Ok(CycleOutcome::AlreadyRunning);
            }
        };

        // Settings are re-read every cycle so operator changes apply
        // without a restart.
        let settings = match self.settings.get().await? {
            Some(s) if s.is_active => s,
            _ => {
                debug!("Bot inactive or unconfigured; skipping cycle");
                return Ok(CycleOutcome::Inactive);
            }
        };

        let members = self
            .gateway
            .list_members_with_role(&settings.watched_role_id)
            .await?;
        debug!("Reconciling {} watched members", members.len());

        let mut result = CycleResult::default();
        for member in &members {
            match self.check_member(member, &settings).await {
                Ok(MemberOutcome::Started) => result.started += 1,
                Ok(MemberOutcome::Ended) => result.ended += 1,
                Ok(MemberOutcome::Refreshed) => result.refreshed += 1,
                Ok(MemberOutcome::Idle) => result.idle += 1,
                Ok(MemberOutcome::Dormant) => result.dormant += 1,
                Err(e) => {
                    warn!(
                        "Error checking member {} ({}): {e}",
                        member.display_name, member.user_id
                    );
                    result.errors += 1;
                }
            }
        }

        info!(
            "Cycle done: {} started, {} ended, {} refreshed, {} idle, {} dormant, {} errors",
            result.started, result.ended, result.refreshed, result.idle, result.dormant,
            result.errors
        );
        Ok(CycleOutcome::Completed(result))
    }

    async fn check_member(
        &self,
        member: &GuildMemberInfo,
        settings: &BotSettings,
    ) -> Result<MemberOutcome, Error> {
        let mut streamer = match self.streamers.get(&member.user_id).await? {
            Some(s) => s,
            None => {
                // First observation: create the record without a handle and
                // let the resolution retry below fill it in.
                let s = Streamer::new(member.user_id.clone(), member.display_name.clone(), None);
                self.streamers.upsert(&s).await?;
                s
            }
        };

        // Dormant members get a resolution retry each cycle, but no
        // status fetch and no last_checked_at advance until it succeeds.
        if streamer.twitch_username.is_none() {
            match self.resolve_handle(&member.user_id).await {
                Some(handle) => {
                    streamer.twitch_username = Some(handle);
                    self.streamers.upsert(&streamer).await?;
                }
                None => {
                    debug!(
                        "No Twitch handle for {} ({}); tracked but dormant",
                        member.display_name, member.user_id
                    );
                    return Ok(MemberOutcome::Dormant);
                }
            }
        }

        let login = streamer
            .twitch_username
            .clone()
            .unwrap_or_default();

        // A fetch failure propagates as a per-member error; the caller
        // counts it and leaves last_checked_at untouched so the member is
        // fully re-evaluated next cycle.
        let snapshot = self.provider.fetch_stream(&login).await?;

        streamer.discord_username = member.display_name.clone();
        streamer.last_checked_at = Utc::now();

        // The transition table compares qualifies-now against the recorded
        // is_live flag; the qualification predicate governs, not raw
        // liveness.
        let qualifying = snapshot.filter(|s| self.filter.matches(s));
        match (qualifying, streamer.is_live) {
            (Some(snapshot), false) => {
                self.handle_stream_start(member, &mut streamer, &snapshot, settings)
                    .await?;
                Ok(MemberOutcome::Started)
            }
            (Some(snapshot), true) => {
                streamer.current_title = Some(snapshot.title.clone());
                streamer.current_viewers = stored_viewer_count(snapshot.viewer_count);
                self.streamers.upsert(&streamer).await?;
                Ok(MemberOutcome::Refreshed)
            }
            (None, true) => {
                // Also covers a still-live stream that stopped qualifying
                // (game or title changed).
                self.handle_stream_end(member, &mut streamer, settings)
                    .await?;
                Ok(MemberOutcome::Ended)
            }
            (None, false) => {
                self.streamers.upsert(&streamer).await?;
                Ok(MemberOutcome::Idle)
            }
        }
    }

    async fn handle_stream_start(
        &self,
        member: &GuildMemberInfo,
        streamer: &mut Streamer,
        snapshot: &StreamSnapshot,
        settings: &BotSettings,
    ) -> Result<(), Error> {
        self.gateway
            .grant_role(&member.user_id, &settings.live_role_id)
            .await?;

        let content = announcement_content(streamer, snapshot);
        let message_id = self
            .gateway
            .post_message(&settings.announce_channel_id, &content)
            .await?;

        streamer.is_live = true;
        streamer.current_title = Some(snapshot.title.clone());
        streamer.current_viewers = stored_viewer_count(snapshot.viewer_count);
        streamer.announcement_message_id = Some(message_id);
        self.streamers.upsert(streamer).await?;

        self.record(
            ActivityKind::RoleGranted,
            member,
            format!("Granted live role to {}", member.display_name),
        )
        .await?;
        self.record(
            ActivityKind::AnnouncementPosted,
            member,
            format!("Posted announcement for {}", member.display_name),
        )
        .await?;
        self.record(
            ActivityKind::StreamStarted,
            member,
            format!("{} started streaming: {}", member.display_name, snapshot.title),
        )
        .await?;

        info!(
            "Stream start for {} ({}): {:?}",
            member.display_name, member.user_id, snapshot.title
        );
        Ok(())
    }

    async fn handle_stream_end(
        &self,
        member: &GuildMemberInfo,
        streamer: &mut Streamer,
        settings: &BotSettings,
    ) -> Result<(), Error> {
        self.gateway
            .revoke_role(&member.user_id, &settings.live_role_id)
            .await?;

        // Best-effort: the announcement may already have been removed by
        // a moderator. Not counted as a cycle error.
        if let Some(message_id) = streamer.announcement_message_id.take() {
            if let Err(e) = self
                .gateway
                .delete_message(&settings.announce_channel_id, &message_id)
                .await
            {
                debug!(
                    "Could not delete announcement {message_id} for {}: {e}",
                    member.display_name
                );
            }
        }

        streamer.is_live = false;
        streamer.current_title = None;
        streamer.current_viewers = 0;
        streamer.announcement_message_id = None;
        self.streamers.upsert(streamer).await?;

        self.record(
            ActivityKind::RoleRevoked,
            member,
            format!("Revoked live role from {}", member.display_name),
        )
        .await?;
        self.record(
            ActivityKind::StreamEnded,
            member,
            format!("{} stopped streaming", member.display_name),
        )
        .await?;

        info!("Stream end for {} ({})", member.display_name, member.user_id);
        Ok(())
    }

    async fn record(
        &self,
        kind: ActivityKind,
        member: &GuildMemberInfo,
        description: String,
    ) -> Result<(), Error> {
        self.activity
            .append(&Activity::new(
                kind,
                &member.user_id,
                &member.display_name,
                description,
            ))
            .await
    }

    /// Handle inference failures are soft: log and treat as unresolved.
    async fn resolve_handle(&self, user_id: &str) -> Option<String> {
        match self.gateway.resolve_twitch_handle(user_id).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Handle resolution failed for {user_id}: {e}");
                None
            }
        }
    }
}

/// The stored column is i32; Helix reports u32. Saturate rather than wrap
/// on counts beyond i32::MAX.
fn stored_viewer_count(viewer_count: u32) -> i32 {
    i32::try_from(viewer_count).unwrap_or(i32::MAX)
}

fn announcement_content(streamer: &Streamer, snapshot: &StreamSnapshot) -> String {
    let login = streamer.twitch_username.as_deref().unwrap_or_default();
    format!(
        "🔴 **{}** is now live on Twitch!\n{}\nhttps://twitch.tv/{}",
        streamer.discord_username, snapshot.title, login
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(game: &str, title: &str) -> StreamSnapshot {
        StreamSnapshot {
            title: title.to_string(),
            game_name: game.to_string(),
            viewer_count: 10,
        }
    }

    #[test]
    fn filter_requires_game_and_keyword() {
        let filter = QualifyFilter::new("Grand Theft Auto V", "rsrp");

        assert!(filter.matches(&snapshot("Grand Theft Auto V", "RSRP | evening patrol")));
        assert!(!filter.matches(&snapshot("Minecraft", "RSRP build day")));
        assert!(!filter.matches(&snapshot("Grand Theft Auto V", "casual races")));
    }

    #[test]
    fn title_match_is_case_insensitive_substring() {
        let filter = QualifyFilter::new("Grand Theft Auto V", "RsRp");
        assert!(filter.matches(&snapshot("Grand Theft Auto V", "late night rSrP grind")));
    }

    #[test]
    fn game_match_is_exact() {
        let filter = QualifyFilter::new("Grand Theft Auto V", "rsrp");
        assert!(!filter.matches(&snapshot("grand theft auto v", "rsrp")));
    }

    #[test]
    fn viewer_count_saturates_instead_of_wrapping() {
        assert_eq!(stored_viewer_count(0), 0);
        assert_eq!(stored_viewer_count(123_456), 123_456);
        assert_eq!(stored_viewer_count(i32::MAX as u32), i32::MAX);
        assert_eq!(stored_viewer_count(i32::MAX as u32 + 1), i32::MAX);
        assert_eq!(stored_viewer_count(u32::MAX), i32::MAX);
    }

    #[test]
    fn announcement_includes_title_and_link() {
        let mut streamer = Streamer::new("1".into(), "Kaisa".into(), Some("kaisatv".into()));
        streamer.discord_username = "Kaisa".into();
        let content = announcement_content(&streamer, &snapshot("Grand Theft Auto V", "RSRP shift"));
        assert!(content.contains("**Kaisa**"));
        assert!(content.contains("RSRP shift"));
        assert!(content.contains("https://twitch.tv/kaisatv"));
    }
}
