use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::db::Repository;
use crate::error::Result;
use crate::services::TrendSourceClient;

use super::controller::PipelineState;
use super::policy;

/// Discovers new trends and seeds their jobs on a fixed cadence.
pub struct TrendCollector {
    repository: Arc<Repository>,
    state: watch::Receiver<PipelineState>,
}

impl TrendCollector {
    pub fn new(repository: Arc<Repository>, state: watch::Receiver<PipelineState>) -> Self {
        Self { repository, state }
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

            let interval = self.tick().await;

            // Sleep the interval, but wake early on a state change so a
            // pause or shutdown takes effect at the next boundary.
            tokio::select! {
                _ = sleep(interval) => {}
                changed = self.state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Trend collector stopped");
    }

    /// One cadence tick. Returns the interval until the next one.
    async fn tick(&self) -> Duration {
        let config = match self.repository.load_config().await {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config: {}", e);
                return Duration::from_secs(policy::POLL_INTERVAL_FLOOR_SECS);
            }
        };

        // The trend source is rate limited; clamp whatever was configured.
        let interval =
            Duration::from_secs(config.poll_interval_secs.max(policy::POLL_INTERVAL_FLOOR_SECS));

        match &config.youtube_api_key {
            None => debug!("Trend source API key not configured, skipping poll"),
            Some(key) => {
                let client = TrendSourceClient::new(key.clone());
                match self.poll_once(&client).await {
                    Ok(0) => debug!("No new trends this poll"),
                    Ok(inserted) => info!("Discovered {} new trends", inserted),
                    Err(e) if e.is_auth() => {
                        warn!("Trend source rejected the API key; fix it in settings: {}", e)
                    }
                    Err(e) => warn!("Trend poll failed: {}", e),
                }
            }
        }

        interval
    }

    /// Fetch the trending chart once and insert every unseen trend with
    /// its job. Duplicates are no-ops, so re-running against the same
    /// chart changes nothing.
    pub async fn poll_once(&self, client: &TrendSourceClient) -> Result<usize> {
        let trends = client.fetch_trending(policy::MAX_TRENDS_PER_POLL).await?;

        let mut inserted = 0;
        for trend in trends {
            let video_id = trend.video_id.clone();
            match self.repository.insert_trend_with_job(trend).await? {
                Some(job_id) => {
                    inserted += 1;
                    info!("Queued job {} for trend {}", job_id, video_id);
                }
                None => debug!("Trend {} already known", video_id),
            }
        }

        Ok(inserted)
    }
}
