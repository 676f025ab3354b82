use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::db::Repository;

use super::controller::PipelineState;
use super::policy;

/// Liveness sweep for jobs orphaned by a crashed or hung worker.
///
/// Runs even while the pipeline is paused: reclaiming rows a dead worker
/// left behind issues no new work, and crash recovery must not depend on
/// the running flag.
pub struct Watchdog {
    repository: Arc<Repository>,
    state: watch::Receiver<PipelineState>,
}

impl Watchdog {
    pub fn new(repository: Arc<Repository>, state: watch::Receiver<PipelineState>) -> Self {
        Self { repository, state }
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(policy::WATCHDOG_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.state.changed() => {
                    if changed.is_err() || *self.state.borrow() == PipelineState::Stopping {
                        break;
                    }
                    continue;
                }
            }

            let stale_before =
                Utc::now() - chrono::Duration::seconds(policy::STALE_AFTER.as_secs() as i64);

            match self
                .repository
                .reclaim_stale(stale_before, policy::MAX_ATTEMPTS)
                .await
            {
                Ok((0, 0)) => {}
                Ok((requeued, failed)) => info!(
                    "Watchdog requeued {} and failed {} stalled jobs",
                    requeued, failed
                ),
                Err(e) => warn!("Watchdog sweep failed: {}", e),
            }
        }
        debug!("Watchdog stopped");
    }
}
