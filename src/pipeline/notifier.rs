use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::db::Repository;
use crate::error::Result;
use crate::models::{Job, JobState, Short, Stage, StageOutcome, Trend};
use crate::services::TelegramClient;

use super::controller::PipelineState;
use super::policy;

/// Announces terminal job outcomes through the messaging bot.
///
/// Announcement is best effort and at-least-once with dedup: delivery has
/// its own bounded retry budget, and neither success nor exhaustion ever
/// re-queues the job itself. Keeps draining while the pipeline is paused
/// (that issues no claims and no trend-source polls); stops on shutdown.
pub struct Notifier {
    repository: Arc<Repository>,
    state: watch::Receiver<PipelineState>,
}

impl Notifier {
    pub fn new(repository: Arc<Repository>, state: watch::Receiver<PipelineState>) -> Self {
        Self { repository, state }
    }

    pub async fn run(mut self) {
        loop {
            if *self.state.borrow() == PipelineState::Stopping {
                break;
            }

            if let Err(e) = self.drain().await {
                warn!("Announcement cycle failed: {}", e);
            }

            tokio::select! {
                _ = sleep(policy::NOTIFY_POLL_INTERVAL) => {}
                changed = self.state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Notifier stopped");
    }

    /// One announcement cycle over the unannounced terminal jobs.
    pub async fn drain(&self) -> Result<usize> {
        let config = self.repository.load_config().await?;
        let (Some(token), Some(chat_id)) = (config.telegram_bot_token, config.telegram_chat_id)
        else {
            debug!("Messaging bot not configured, skipping announcements");
            return Ok(0);
        };

        let pending = self
            .repository
            .unnotified_terminal_jobs(policy::NOTIFY_BATCH_SIZE)
            .await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let client = TelegramClient::new(token, chat_id);
        let mut announced = 0;
        for (job, trend, short) in pending {
            let message = compose_message(&job, &trend, short.as_ref());
            self.deliver(&client, job.id, &message).await?;
            announced += 1;
        }

        Ok(announced)
    }

    /// Delivery with its own bounded backoff. Auth failures abort the
    /// cycle (a bad token fails every send); transient failures retry,
    /// and exhaustion marks the job announced anyway with a failed
    /// `notify` metric so one unreachable chat cannot wedge the queue.
    async fn deliver(&self, client: &TelegramClient, job_id: i64, message: &str) -> Result<()> {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            match client.send_message(message).await {
                Ok(()) => {
                    self.repository.mark_notified(job_id).await?;
                    self.repository
                        .record_metric(
                            job_id,
                            Stage::Notify,
                            started.elapsed().as_millis() as u64,
                            StageOutcome::Success,
                        )
                        .await?;
                    return Ok(());
                }
                Err(e) if e.is_auth() => return Err(e),
                Err(e) if attempt + 1 < policy::NOTIFY_MAX_ATTEMPTS => {
                    let delay = policy::notify_backoff_delay(attempt);
                    attempt += 1;
                    debug!(
                        "Delivery attempt {} for job {} failed, retrying in {:?}: {}",
                        attempt, job_id, delay, e
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    warn!(
                        "Giving up announcing job {} after {} attempts: {}",
                        job_id,
                        attempt + 1,
                        e
                    );
                    self.repository.mark_notified(job_id).await?;
                    self.repository
                        .record_metric(
                            job_id,
                            Stage::Notify,
                            started.elapsed().as_millis() as u64,
                            StageOutcome::Failure,
                        )
                        .await?;
                    return Ok(());
                }
            }
        }
    }
}

fn compose_message(job: &Job, trend: &Trend, short: Option<&Short>) -> String {
    match job.state {
        JobState::Completed => {
            let asset = short
                .map(|s| s.asset_path.as_str())
                .unwrap_or("unknown location");
            format!("✅ Short ready: {}\nSaved to {}", trend.title, asset)
        }
        _ => format!(
            "❌ Generation failed: {}\n{}",
            trend.title,
            job.last_error.as_deref().unwrap_or("unknown error")
        ),
    }
}
