// tests/engine_tests.rs
//
// Reconciliation engine behavior against mock gateway/provider
// collaborators and the in-memory repositories.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::{sleep, Duration};

use streamwatch_common::models::{
    Activity, ActivityKind, BotSettings, GuildMemberInfo, StreamSnapshot, Streamer,
};
use streamwatch_common::traits::platform_traits::{RoleChannelGateway, StreamStatusProvider};
use streamwatch_common::traits::repository_traits::{
    ActivityRepository, BotSettingsRepository, StreamerRepository,
};
use streamwatch_common::Error;
use streamwatch_core::repositories::{
    MemoryActivityRepository, MemoryBotSettingsRepository, MemoryStreamerRepository,
};
use streamwatch_core::services::{CycleOutcome, CycleResult, QualifyFilter, ReconciliationEngine};

const WATCHED_ROLE: &str = "100";
const LIVE_ROLE: &str = "200";
const ANNOUNCE_CHANNEL: &str = "300";

#[derive(Default)]
struct MockGateway {
    members: Mutex<Vec<GuildMemberInfo>>,
    handles: Mutex<HashMap<String, String>>,
    roles_held: Mutex<HashMap<String, HashSet<String>>>,
    posted: Mutex<Vec<(String, String, String)>>, // (message_id, channel, content)
    deleted: Mutex<Vec<String>>,
    fail_member_list: Mutex<bool>,
    fail_message_delete: Mutex<bool>,
    resolve_calls: AtomicUsize,
    next_message_id: AtomicUsize,
    list_delay_ms: Mutex<u64>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockGateway {
    fn add_member(&self, user_id: &str, display_name: &str) {
        self.members.lock().unwrap().push(GuildMemberInfo {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
        });
    }

    fn set_handle(&self, user_id: &str, login: &str) {
        self.handles
            .lock()
            .unwrap()
            .insert(user_id.to_string(), login.to_string());
    }

    fn hold_role(&self, user_id: &str, role_id: &str) {
        self.roles_held
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .insert(role_id.to_string());
    }

    fn has_role(&self, user_id: &str, role_id: &str) -> bool {
        self.roles_held
            .lock()
            .unwrap()
            .get(user_id)
            .map(|roles| roles.contains(role_id))
            .unwrap_or(false)
    }

    fn posted_count(&self) -> usize {
        self.posted.lock().unwrap().len()
    }
}

#[async_trait]
impl RoleChannelGateway for MockGateway {
    async fn list_members_with_role(&self, role_id: &str) -> Result<Vec<GuildMemberInfo>, Error> {
        let entered = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(entered, Ordering::SeqCst);

        let delay = *self.list_delay_ms.lock().unwrap();
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if *self.fail_member_list.lock().unwrap() {
            return Err(Error::Config(format!("role {role_id} not resolvable")));
        }
        Ok(self.members.lock().unwrap().clone())
    }

    async fn grant_role(&self, user_id: &str, role_id: &str) -> Result<(), Error> {
        // Idempotent like the real platform: re-inserting a held role is
        // a no-op.
        self.roles_held
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .insert(role_id.to_string());
        Ok(())
    }

    async fn revoke_role(&self, user_id: &str, role_id: &str) -> Result<(), Error> {
        if let Some(roles) = self.roles_held.lock().unwrap().get_mut(user_id) {
            roles.remove(role_id);
        }
        Ok(())
    }

    async fn post_message(&self, channel_id: &str, content: &str) -> Result<String, Error> {
        let n = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        let message_id = format!("msg-{n}");
        self.posted.lock().unwrap().push((
            message_id.clone(),
            channel_id.to_string(),
            content.to_string(),
        ));
        Ok(message_id)
    }

    async fn delete_message(&self, _channel_id: &str, message_id: &str) -> Result<(), Error> {
        if *self.fail_message_delete.lock().unwrap() {
            return Err(Error::Platform("message already deleted".into()));
        }
        self.deleted.lock().unwrap().push(message_id.to_string());
        Ok(())
    }

    async fn resolve_twitch_handle(&self, user_id: &str) -> Result<Option<String>, Error> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.handles.lock().unwrap().get(user_id).cloned())
    }
}

enum MockStream {
    Live(StreamSnapshot),
    Offline,
    Fail,
}

#[derive(Default)]
struct MockProvider {
    streams: Mutex<HashMap<String, MockStream>>,
    fetched: Mutex<Vec<String>>,
}

impl MockProvider {
    fn set_live(&self, login: &str, game: &str, title: &str, viewers: u32) {
        self.streams.lock().unwrap().insert(
            login.to_string(),
            MockStream::Live(StreamSnapshot {
                title: title.to_string(),
                game_name: game.to_string(),
                viewer_count: viewers,
            }),
        );
    }

    fn set_offline(&self, login: &str) {
        self.streams
            .lock()
            .unwrap()
            .insert(login.to_string(), MockStream::Offline);
    }

    fn set_failing(&self, login: &str) {
        self.streams
            .lock()
            .unwrap()
            .insert(login.to_string(), MockStream::Fail);
    }

    fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }
}

#[async_trait]
impl StreamStatusProvider for MockProvider {
    async fn fetch_stream(&self, twitch_login: &str) -> Result<Option<StreamSnapshot>, Error> {
        self.fetched.lock().unwrap().push(twitch_login.to_string());
        match self.streams.lock().unwrap().get(twitch_login) {
            Some(MockStream::Live(snap)) => Ok(Some(snap.clone())),
            Some(MockStream::Fail) => Err(Error::Platform("helix unavailable".into())),
            _ => Ok(None),
        }
    }
}

struct Harness {
    engine: ReconciliationEngine,
    gateway: Arc<MockGateway>,
    provider: Arc<MockProvider>,
    streamers: Arc<MemoryStreamerRepository>,
    settings: Arc<MemoryBotSettingsRepository>,
    activity: Arc<MemoryActivityRepository>,
}

fn active_settings() -> BotSettings {
    BotSettings {
        watched_role_id: WATCHED_ROLE.to_string(),
        live_role_id: LIVE_ROLE.to_string(),
        announce_channel_id: ANNOUNCE_CHANNEL.to_string(),
        check_interval_seconds: 60,
        is_active: true,
    }
}

fn harness_with_settings(settings: Option<BotSettings>) -> Harness {
    let gateway = Arc::new(MockGateway::default());
    let provider = Arc::new(MockProvider::default());
    let streamers = Arc::new(MemoryStreamerRepository::new());
    let settings = Arc::new(match settings {
        Some(s) => MemoryBotSettingsRepository::with_settings(s),
        None => MemoryBotSettingsRepository::new(),
    });
    let activity = Arc::new(MemoryActivityRepository::new());

    let engine = ReconciliationEngine::new(
        streamers.clone(),
        settings.clone(),
        activity.clone(),
        gateway.clone(),
        provider.clone(),
        QualifyFilter::new("Grand Theft Auto V", "rsrp"),
    );

    Harness {
        engine,
        gateway,
        provider,
        streamers,
        settings,
        activity,
    }
}

fn harness() -> Harness {
    harness_with_settings(Some(active_settings()))
}

fn completed(outcome: CycleOutcome) -> CycleResult {
    match outcome {
        CycleOutcome::Completed(result) => result,
        other => panic!("expected a completed cycle, got {other:?}"),
    }
}

async fn activities_of_kind(repo: &MemoryActivityRepository, kind: ActivityKind) -> Vec<Activity> {
    repo.recent(1000)
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.kind == kind)
        .collect()
}

#[tokio::test]
async fn qualifying_stream_triggers_start_transition() -> Result<(), Error> {
    let h = harness();
    h.gateway.add_member("1", "Kaisa");
    h.gateway.set_handle("1", "kaisatv");
    h.provider.set_live("kaisatv", "Grand Theft Auto V", "RSRP | evening patrol", 42);

    let result = completed(h.engine.run_cycle().await?);
    assert_eq!(result.started, 1);
    assert_eq!(result.errors, 0);

    assert!(h.gateway.has_role("1", LIVE_ROLE), "live role granted");
    assert_eq!(h.gateway.posted_count(), 1, "one announcement posted");

    let record = h.streamers.get("1").await?.unwrap();
    assert!(record.is_live);
    assert_eq!(record.current_title.as_deref(), Some("RSRP | evening patrol"));
    assert_eq!(record.current_viewers, 42);
    assert!(record.announcement_message_id.is_some());

    let started = activities_of_kind(&h.activity, ActivityKind::StreamStarted).await;
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].discord_user_id, "1");

    Ok(())
}

#[tokio::test]
async fn category_mismatch_ends_session_even_while_provider_live() -> Result<(), Error> {
    let h = harness();
    h.gateway.add_member("1", "Kaisa");
    h.gateway.set_handle("1", "kaisatv");
    h.gateway.hold_role("1", LIVE_ROLE);

    let mut record = Streamer::new("1".into(), "Kaisa".into(), Some("kaisatv".into()));
    record.is_live = true;
    record.current_title = Some("RSRP shift".into());
    record.current_viewers = 30;
    record.announcement_message_id = Some("msg-old".into());
    h.streamers.upsert(&record).await?;

    // Still live on Twitch, but the game changed: qualification governs.
    h.provider.set_live("kaisatv", "Minecraft", "RSRP build day", 55);

    let result = completed(h.engine.run_cycle().await?);
    assert_eq!(result.ended, 1);
    assert_eq!(result.idle, 0);

    assert!(!h.gateway.has_role("1", LIVE_ROLE), "live role revoked");
    assert_eq!(*h.gateway.deleted.lock().unwrap(), vec!["msg-old".to_string()]);

    let record = h.streamers.get("1").await?.unwrap();
    assert!(!record.is_live);
    assert!(record.current_title.is_none());
    assert_eq!(record.current_viewers, 0);
    assert!(record.announcement_message_id.is_none());

    assert_eq!(
        activities_of_kind(&h.activity, ActivityKind::StreamEnded).await.len(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn transition_table_covers_all_four_combinations() -> Result<(), Error> {
    let h = harness();

    // (now=true, before=false) => start
    h.gateway.add_member("1", "Starter");
    h.gateway.set_handle("1", "starter");
    h.provider.set_live("starter", "Grand Theft Auto V", "rsrp opening", 5);

    // (now=true, before=true) => refresh
    h.gateway.add_member("2", "Refresher");
    h.gateway.set_handle("2", "refresher");
    let mut live = Streamer::new("2".into(), "Refresher".into(), Some("refresher".into()));
    live.is_live = true;
    live.current_title = Some("rsrp old title".into());
    live.current_viewers = 10;
    live.announcement_message_id = Some("msg-keep".into());
    h.streamers.upsert(&live).await?;
    h.provider.set_live("refresher", "Grand Theft Auto V", "rsrp new title", 99);

    // (now=false, before=true) => end
    h.gateway.add_member("3", "Ender");
    h.gateway.set_handle("3", "ender");
    let mut ending = Streamer::new("3".into(), "Ender".into(), Some("ender".into()));
    ending.is_live = true;
    ending.announcement_message_id = Some("msg-gone".into());
    h.streamers.upsert(&ending).await?;
    h.provider.set_offline("ender");

    // (now=false, before=false) => idle
    h.gateway.add_member("4", "Idler");
    h.gateway.set_handle("4", "idler");
    h.provider.set_offline("idler");

    let result = completed(h.engine.run_cycle().await?);
    assert_eq!(
        result,
        CycleResult {
            started: 1,
            ended: 1,
            refreshed: 1,
            idle: 1,
            dormant: 0,
            errors: 0,
        }
    );

    let starter = h.streamers.get("1").await?.unwrap();
    assert!(starter.is_live && starter.announcement_message_id.is_some());

    let refresher = h.streamers.get("2").await?.unwrap();
    assert!(refresher.is_live);
    assert_eq!(refresher.current_title.as_deref(), Some("rsrp new title"));
    assert_eq!(refresher.current_viewers, 99);
    assert_eq!(
        refresher.announcement_message_id.as_deref(),
        Some("msg-keep"),
        "refresh must not touch the announcement"
    );

    let ender = h.streamers.get("3").await?.unwrap();
    assert!(!ender.is_live && ender.announcement_message_id.is_none());

    let idler = h.streamers.get("4").await?.unwrap();
    assert!(!idler.is_live && idler.announcement_message_id.is_none());

    Ok(())
}

#[tokio::test]
async fn at_most_one_announcement_per_live_session() -> Result<(), Error> {
    let h = harness();
    h.gateway.add_member("1", "Kaisa");
    h.gateway.set_handle("1", "kaisatv");
    h.provider.set_live("kaisatv", "Grand Theft Auto V", "rsrp", 1);

    completed(h.engine.run_cycle().await?);
    let first_id = h
        .streamers
        .get("1")
        .await?
        .unwrap()
        .announcement_message_id
        .unwrap();

    // Several refresh cycles while the session stays qualifying.
    for viewers in [2, 3, 4] {
        h.provider.set_live("kaisatv", "Grand Theft Auto V", "rsrp", viewers);
        completed(h.engine.run_cycle().await?);
    }

    assert_eq!(h.gateway.posted_count(), 1, "exactly one message for the session");
    let record = h.streamers.get("1").await?.unwrap();
    assert_eq!(record.announcement_message_id.as_deref(), Some(first_id.as_str()));
    assert_eq!(
        activities_of_kind(&h.activity, ActivityKind::StreamStarted).await.len(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn dormant_member_skipped_until_handle_resolves() -> Result<(), Error> {
    let h = harness();
    h.gateway.add_member("1", "NoHandle");

    let result = completed(h.engine.run_cycle().await?);
    assert_eq!(result.dormant, 1);
    assert_eq!(h.provider.fetch_count(), 0, "no status fetch while dormant");

    let after_first = h.streamers.get("1").await?.unwrap();
    completed(h.engine.run_cycle().await?);
    let after_second = h.streamers.get("1").await?.unwrap();
    assert_eq!(
        after_first.last_checked_at, after_second.last_checked_at,
        "last_checked_at not advanced while dormant"
    );

    // Handle becomes resolvable; member wakes up on the next cycle.
    h.gateway.set_handle("1", "nowresolved");
    h.provider.set_offline("nowresolved");
    let result = completed(h.engine.run_cycle().await?);
    assert_eq!(result.idle, 1);
    assert_eq!(h.provider.fetch_count(), 1);

    let woken = h.streamers.get("1").await?.unwrap();
    assert_eq!(woken.twitch_username.as_deref(), Some("nowresolved"));
    assert!(woken.last_checked_at > after_second.last_checked_at);

    Ok(())
}

#[tokio::test]
async fn handle_resolution_attempted_once_per_cycle() -> Result<(), Error> {
    let h = harness();
    h.gateway.add_member("1", "Fresh");
    h.gateway.set_handle("1", "freshlogin");
    h.provider.set_offline("freshlogin");

    // First observation: one presence lookup, not one per code path.
    completed(h.engine.run_cycle().await?);
    assert_eq!(h.gateway.resolve_calls.load(Ordering::SeqCst), 1);

    // Resolved handles are never looked up again.
    completed(h.engine.run_cycle().await?);
    assert_eq!(h.gateway.resolve_calls.load(Ordering::SeqCst), 1);

    // A dormant member gets exactly one retry per cycle.
    h.gateway.add_member("2", "NoHandle");
    completed(h.engine.run_cycle().await?);
    assert_eq!(h.gateway.resolve_calls.load(Ordering::SeqCst), 2);
    completed(h.engine.run_cycle().await?);
    assert_eq!(h.gateway.resolve_calls.load(Ordering::SeqCst), 3);

    Ok(())
}

#[tokio::test]
async fn oversized_viewer_count_is_clamped() -> Result<(), Error> {
    let h = harness();
    h.gateway.add_member("1", "Kaisa");
    h.gateway.set_handle("1", "kaisatv");
    h.provider.set_live("kaisatv", "Grand Theft Auto V", "rsrp", u32::MAX);

    let result = completed(h.engine.run_cycle().await?);
    assert_eq!(result.started, 1);

    let record = h.streamers.get("1").await?.unwrap();
    assert_eq!(record.current_viewers, i32::MAX, "clamped, not wrapped negative");

    Ok(())
}

#[tokio::test]
async fn per_member_fetch_failure_does_not_abort_cycle() -> Result<(), Error> {
    let h = harness();
    h.gateway.add_member("1", "Broken");
    h.gateway.set_handle("1", "brokenlogin");
    h.provider.set_failing("brokenlogin");

    h.gateway.add_member("2", "Fine");
    h.gateway.set_handle("2", "finelogin");
    h.provider.set_live("finelogin", "Grand Theft Auto V", "rsrp", 7);

    let result = completed(h.engine.run_cycle().await?);
    assert_eq!(result.errors, 1);
    assert_eq!(result.started, 1, "healthy member still processed");

    // The errored member's timestamp stays put so it is fully
    // re-evaluated next cycle.
    let broken_before = h.streamers.get("1").await?.unwrap();
    h.provider.set_failing("brokenlogin");
    completed(h.engine.run_cycle().await?);
    let broken_after = h.streamers.get("1").await?.unwrap();
    assert_eq!(broken_before.last_checked_at, broken_after.last_checked_at);

    Ok(())
}

#[tokio::test]
async fn inactive_or_missing_settings_is_a_noop() -> Result<(), Error> {
    let mut settings = active_settings();
    settings.is_active = false;
    let h = harness_with_settings(Some(settings));
    h.gateway.add_member("1", "Kaisa");

    assert_eq!(h.engine.run_cycle().await?, CycleOutcome::Inactive);
    assert_eq!(h.provider.fetch_count(), 0);

    let h = harness_with_settings(None);
    assert_eq!(h.engine.run_cycle().await?, CycleOutcome::Inactive);

    Ok(())
}

#[tokio::test]
async fn role_enumeration_failure_aborts_cycle() {
    let h = harness();
    h.gateway.add_member("1", "Kaisa");
    *h.gateway.fail_member_list.lock().unwrap() = true;

    let err = h.engine.run_cycle().await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(h.provider.fetch_count(), 0, "no member was processed");
}

#[tokio::test]
async fn concurrent_triggers_are_single_flight() -> Result<(), Error> {
    let h = harness();
    h.gateway.add_member("1", "Kaisa");
    h.gateway.set_handle("1", "kaisatv");
    h.provider.set_offline("kaisatv");
    *h.gateway.list_delay_ms.lock().unwrap() = 100;

    let engine = Arc::new(h.engine);
    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_cycle().await })
    };
    // Let the first cycle take the guard before triggering the second.
    sleep(Duration::from_millis(20)).await;
    let second = engine.run_cycle().await?;
    assert_eq!(second, CycleOutcome::AlreadyRunning);

    let first = first.await.expect("task join")?;
    assert!(matches!(first, CycleOutcome::Completed(_)));
    assert_eq!(
        h.gateway.max_in_flight.load(Ordering::SeqCst),
        1,
        "never more than one cycle in flight"
    );

    Ok(())
}

#[tokio::test]
async fn start_recovers_when_role_already_held() -> Result<(), Error> {
    // Crash-recovery shape: the role grant from a previous attempt
    // landed but the record was never updated. Re-running start must
    // succeed via the idempotent grant.
    let h = harness();
    h.gateway.add_member("1", "Kaisa");
    h.gateway.set_handle("1", "kaisatv");
    h.gateway.hold_role("1", LIVE_ROLE);
    h.provider.set_live("kaisatv", "Grand Theft Auto V", "rsrp", 3);

    let result = completed(h.engine.run_cycle().await?);
    assert_eq!(result.started, 1);
    assert_eq!(result.errors, 0);
    assert!(h.gateway.has_role("1", LIVE_ROLE));
    assert!(h.streamers.get("1").await?.unwrap().is_live);

    Ok(())
}

#[tokio::test]
async fn announcement_delete_failure_is_swallowed_on_end() -> Result<(), Error> {
    let h = harness();
    h.gateway.add_member("1", "Kaisa");
    h.gateway.set_handle("1", "kaisatv");
    *h.gateway.fail_message_delete.lock().unwrap() = true;

    let mut record = Streamer::new("1".into(), "Kaisa".into(), Some("kaisatv".into()));
    record.is_live = true;
    record.announcement_message_id = Some("msg-moderated".into());
    h.streamers.upsert(&record).await?;
    h.provider.set_offline("kaisatv");

    let result = completed(h.engine.run_cycle().await?);
    assert_eq!(result.ended, 1);
    assert_eq!(result.errors, 0, "delete failure is not a cycle error");

    let record = h.streamers.get("1").await?.unwrap();
    assert!(!record.is_live);
    assert!(record.announcement_message_id.is_none());

    Ok(())
}

#[tokio::test]
async fn settings_changes_apply_on_next_cycle() -> Result<(), Error> {
    let h = harness();
    h.gateway.add_member("1", "Kaisa");
    h.gateway.set_handle("1", "kaisatv");
    h.provider.set_offline("kaisatv");

    completed(h.engine.run_cycle().await?);

    // Operator disables the bot between cycles.
    h.settings
        .update(&streamwatch_common::models::BotSettingsPatch {
            is_active: Some(false),
            ..Default::default()
        })
        .await?;

    assert_eq!(h.engine.run_cycle().await?, CycleOutcome::Inactive);
    Ok(())
}
