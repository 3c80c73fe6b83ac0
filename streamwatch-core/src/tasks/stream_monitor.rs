use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use crate::services::reconcile::{CycleOutcome, ReconciliationEngine};
use streamwatch_common::traits::repository_traits::BotSettingsRepository;

/// Used while no settings row exists or the configured interval is
/// invalid.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// Spawns the background task that periodically runs a reconciliation
/// cycle.
///
/// The interval is re-read from settings every iteration so operator
/// changes take effect on the next tick. Sleeping between cycles (rather
/// than a free-running interval) means an overrunning cycle can never be
/// double-scheduled; a manual refresh landing mid-cycle is coalesced by
/// the engine's single-flight guard.
pub fn spawn_stream_monitor_task(
    engine: Arc<ReconciliationEngine>,
    settings_repo: Arc<dyn BotSettingsRepository>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Stream monitor task started");

        // Check immediately at startup.
        run_once(&engine).await;

        loop {
            let secs = match settings_repo.get().await {
                Ok(Some(s)) if s.check_interval_seconds > 0 => s.check_interval_seconds as u64,
                Ok(_) => DEFAULT_CHECK_INTERVAL_SECS,
                Err(e) => {
                    error!("Failed to read settings for interval: {e}");
                    DEFAULT_CHECK_INTERVAL_SECS
                }
            };
            sleep(Duration::from_secs(secs)).await;
            run_once(&engine).await;
        }
    })
}

async fn run_once(engine: &ReconciliationEngine) {
    match engine.run_cycle().await {
        Ok(CycleOutcome::Completed(result)) => {
            debug!("Scheduled cycle complete: {result:?}");
        }
        Ok(CycleOutcome::Inactive) => {
            debug!("Bot inactive; scheduled cycle skipped");
        }
        Ok(CycleOutcome::AlreadyRunning) => {
            debug!("Cycle still in flight; tick coalesced");
        }
        Err(e) => {
            // Recoverable (configuration) errors land here; retried on
            // the next tick.
            error!("Reconciliation cycle failed: {e}");
        }
    }
}
