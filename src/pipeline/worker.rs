use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{Job, Stage, StageOutcome, Trend};
use crate::services::{Assembler, ScriptGenerator};

use super::controller::PipelineState;
use super::policy;

/// One member of the generation pool. Holds at most one claim at a time,
/// which bounds concurrent inference and assembly to the pool size.
pub struct GenerationWorker {
    id: usize,
    repository: Arc<Repository>,
    assembler: Arc<dyn Assembler>,
    state: watch::Receiver<PipelineState>,
}

impl GenerationWorker {
    pub fn new(
        id: usize,
        repository: Arc<Repository>,
        assembler: Arc<dyn Assembler>,
        state: watch::Receiver<PipelineState>,
    ) -> Self {
        Self {
            id,
            repository,
            assembler,
            state,
        }
    }

    pub async fn run(mut self) {
        loop {
            let state = *self.state.borrow();
            match state {
                PipelineState::Stopping => break,
                PipelineState::Paused => {
                    if self.state.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                PipelineState::Running => {}
            }

            let idle = match self.run_once().await {
                Ok(processed) => !processed,
                Err(e) => {
                    warn!("Worker {}: {}", self.id, e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = sleep(policy::CLAIM_IDLE_BACKOFF) => {}
                    changed = self.state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        debug!("Worker {} stopped", self.id);
    }

    /// Claim and process at most one job. Returns whether one was
    /// processed.
    pub async fn run_once(&self) -> Result<bool> {
        let Some((job, trend)) = self.repository.claim_next().await? else {
            return Ok(false);
        };

        info!(
            "Worker {} claimed job {} for trend \"{}\"",
            self.id, job.id, trend.title
        );
        self.process(job, trend).await?;
        Ok(true)
    }

    /// The error boundary: stage failures are recorded on the job and in
    /// metrics, never thrown past this function. Every exit path leaves
    /// the store consistent.
    async fn process(&self, job: Job, trend: Trend) -> Result<()> {
        if !self.repository.mark_generating(job.id).await? {
            // Something else (the watchdog, most likely) moved the row
            // since the claim. Skip it; the row's new owner decides.
            warn!("Job {} no longer claimed when starting stages, skipping", job.id);
            return Ok(());
        }
        let attempt = job.attempt_count + 1;

        // Config is re-read per job so endpoint edits apply to the next
        // claim, not the next restart.
        let config = self.repository.load_config().await?;
        let generator = ScriptGenerator::new(&config.ollama_endpoint);

        // Stage 1: script synthesis.
        let started = Instant::now();
        let script = match generator
            .generate_script(&trend.title, trend.channel.as_deref())
            .await
        {
            Ok(script) => {
                self.repository
                    .record_metric(job.id, Stage::Script, elapsed_ms(started), StageOutcome::Success)
                    .await?;
                script
            }
            Err(e) => {
                self.repository
                    .record_metric(job.id, Stage::Script, elapsed_ms(started), StageOutcome::Failure)
                    .await?;
                return self.handle_stage_failure(job.id, attempt, e).await;
            }
        };

        // Stage 2: asset assembly.
        let started = Instant::now();
        match self.assembler.assemble(job.id, &trend.title, &script).await {
            Ok(asset_path) => {
                self.repository
                    .record_metric(job.id, Stage::Assemble, elapsed_ms(started), StageOutcome::Success)
                    .await?;
                let completed = self
                    .repository
                    .complete_job(job.id, asset_path.to_string_lossy().into_owned(), script)
                    .await?;
                if completed {
                    info!("Worker {} completed job {}", self.id, job.id);
                } else {
                    warn!("Job {} left generating before completion was recorded", job.id);
                }
                Ok(())
            }
            Err(e) => {
                self.repository
                    .record_metric(job.id, Stage::Assemble, elapsed_ms(started), StageOutcome::Failure)
                    .await?;
                self.handle_stage_failure(job.id, attempt, e).await
            }
        }
    }

    async fn handle_stage_failure(&self, job_id: i64, attempt: i64, error: AppError) -> Result<()> {
        let message = error.to_string();

        if error.is_permanent() {
            warn!("Job {} failed permanently: {}", job_id, message);
            self.repository.fail_job(job_id, message).await?;
        } else if attempt >= policy::MAX_ATTEMPTS {
            warn!(
                "Job {} out of attempts ({}), failing: {}",
                job_id, attempt, message
            );
            self.repository.fail_job(job_id, message).await?;
        } else {
            let deadline = policy::backoff_deadline(Utc::now(), attempt);
            debug!(
                "Job {} attempt {} failed, eligible again at {}: {}",
                job_id, attempt, deadline, message
            );
            self.repository.retry_job(job_id, message, deadline).await?;
        }

        Ok(())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
