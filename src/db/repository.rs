use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::config::Config;
use crate::error::Result;
use crate::models::{DashboardStats, Job, JobState, NewTrend, Short, Stage, StageOutcome, Trend};

use super::schema::SCHEMA;

/// All pipeline state lives behind this wrapper; components coordinate
/// exclusively through it. Conditional single-row updates are the only
/// concurrency control; there are no in-process locks.
#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.pragma_update(None, "busy_timeout", 5000)?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Config

    pub async fn load_config(&self) -> Result<Config> {
        let config = self
            .conn
            .call(|conn| {
                let config = conn
                    .query_row(
                        "SELECT youtube_api_key, telegram_bot_token, telegram_chat_id,
                                ollama_endpoint, poll_interval_secs
                         FROM config WHERE id = 1",
                        [],
                        |row| {
                            Ok(Config {
                                youtube_api_key: row.get(0)?,
                                telegram_bot_token: row.get(1)?,
                                telegram_chat_id: row.get(2)?,
                                ollama_endpoint: row.get(3)?,
                                poll_interval_secs: row.get::<_, i64>(4)? as u64,
                            })
                        },
                    )
                    .optional()?;
                Ok(config)
            })
            .await?;

        Ok(config.unwrap_or_default().normalized())
    }

    pub async fn save_config(&self, config: Config) -> Result<()> {
        let config = config.normalized();
        config.validate()?;

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO config (id, youtube_api_key, telegram_bot_token, telegram_chat_id,
                                           ollama_endpoint, poll_interval_secs)
                       VALUES (1, ?1, ?2, ?3, ?4, ?5)
                       ON CONFLICT(id) DO UPDATE SET
                           youtube_api_key = excluded.youtube_api_key,
                           telegram_bot_token = excluded.telegram_bot_token,
                           telegram_chat_id = excluded.telegram_chat_id,
                           ollama_endpoint = excluded.ollama_endpoint,
                           poll_interval_secs = excluded.poll_interval_secs"#,
                    params![
                        config.youtube_api_key,
                        config.telegram_bot_token,
                        config.telegram_chat_id,
                        config.ollama_endpoint,
                        config.poll_interval_secs as i64,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Trends

    /// Insert a trend and its job in one transaction.
    ///
    /// Returns the new job id, or `None` when the trend was already known
    /// (duplicate discoveries are a no-op, never a second job). Both rows
    /// land together or not at all, so a crash can never leave a trend
    /// without a job.
    pub async fn insert_trend_with_job(&self, trend: NewTrend) -> Result<Option<i64>> {
        let now = Utc::now().to_rfc3339();

        let job_id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO trends (video_id, title, channel, score, discovered_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![trend.video_id, trend.title, trend.channel, trend.score, now],
                )?;
                if inserted == 0 {
                    return Ok(None);
                }

                let trend_id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO jobs (trend_id, state, created_at, updated_at)
                     VALUES (?1, 'pending', ?2, ?2)",
                    params![trend_id, now],
                )?;
                let job_id = tx.last_insert_rowid();

                tx.commit()?;
                Ok(Some(job_id))
            })
            .await?;

        Ok(job_id)
    }

    // Job state machine
    //
    // Every transition below is a conditional update guarded on the
    // current state; zero rows affected means another worker (or the
    // watchdog) got there first and the caller must back off.

    /// Claim the oldest eligible pending job.
    ///
    /// Eligible means `pending` and past its backoff deadline, if any.
    /// Returns `None` when nothing is eligible or the claim race was lost.
    pub async fn claim_next(&self) -> Result<Option<(Job, Trend)>> {
        let now = Utc::now().to_rfc3339();

        let claimed = self
            .conn
            .call(move |conn| {
                let candidate: Option<i64> = conn
                    .query_row(
                        "SELECT id FROM jobs
                         WHERE state = 'pending'
                           AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
                         ORDER BY created_at ASC, id ASC
                         LIMIT 1",
                        params![now],
                        |row| row.get(0),
                    )
                    .optional()?;

                let Some(job_id) = candidate else {
                    return Ok(None);
                };

                let updated = conn.execute(
                    "UPDATE jobs SET state = 'claimed', claimed_at = ?1, updated_at = ?1
                     WHERE id = ?2 AND state = 'pending'",
                    params![now, job_id],
                )?;
                if updated == 0 {
                    // Lost the race; the caller polls again.
                    return Ok(None);
                }

                let job = conn.query_row(
                    "SELECT id, trend_id, state, attempt_count, last_error, next_attempt_at,
                            claimed_at, notified_at, created_at, updated_at
                     FROM jobs WHERE id = ?1",
                    params![job_id],
                    |row| Ok(job_from_row(row)),
                )?;
                let trend = conn.query_row(
                    "SELECT id, video_id, title, channel, score, discovered_at
                     FROM trends WHERE id = ?1",
                    params![job.trend_id],
                    |row| Ok(trend_from_row(row)),
                )?;

                Ok(Some((job, trend)))
            })
            .await?;

        Ok(claimed)
    }

    /// Begin stage execution; counts the attempt.
    pub async fn mark_generating(&self, job_id: i64) -> Result<bool> {
        let now = Utc::now().to_rfc3339();

        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE jobs
                     SET state = 'generating', attempt_count = attempt_count + 1, updated_at = ?1
                     WHERE id = ?2 AND state = 'claimed'",
                    params![now, job_id],
                )?;
                Ok(updated > 0)
            })
            .await?;

        Ok(updated)
    }

    /// Finish a job: the completed transition and the short row are one
    /// transaction, so a short exists if and only if its job completed.
    pub async fn complete_job(
        &self,
        job_id: i64,
        asset_path: String,
        script_text: String,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();

        let completed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let updated = tx.execute(
                    "UPDATE jobs SET state = 'completed', last_error = NULL, updated_at = ?1
                     WHERE id = ?2 AND state = 'generating'",
                    params![now, job_id],
                )?;
                if updated == 0 {
                    return Ok(false);
                }

                tx.execute(
                    "INSERT INTO shorts (job_id, asset_path, script_text, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![job_id, asset_path, script_text, now],
                )?;

                tx.commit()?;
                Ok(true)
            })
            .await?;

        Ok(completed)
    }

    /// Return a job to the queue after a retryable failure; it becomes
    /// claimable again once `next_attempt_at` passes.
    pub async fn retry_job(
        &self,
        job_id: i64,
        error: String,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let deadline = next_attempt_at.to_rfc3339();

        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE jobs
                     SET state = 'pending', last_error = ?1, next_attempt_at = ?2,
                         claimed_at = NULL, updated_at = ?3
                     WHERE id = ?4 AND state = 'generating'",
                    params![error, deadline, now, job_id],
                )?;
                Ok(updated > 0)
            })
            .await?;

        Ok(updated)
    }

    /// Terminal failure; the row is kept for audit.
    pub async fn fail_job(&self, job_id: i64, error: String) -> Result<bool> {
        let now = Utc::now().to_rfc3339();

        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE jobs SET state = 'failed', last_error = ?1, updated_at = ?2
                     WHERE id = ?3 AND state IN ('claimed', 'generating')",
                    params![error, now, job_id],
                )?;
                Ok(updated > 0)
            })
            .await?;

        Ok(updated)
    }

    /// Watchdog sweep: jobs stuck in `claimed`/`generating` since before
    /// `stale_before` go back to `pending` with the lost attempt charged,
    /// or straight to `failed` once the attempt budget is spent.
    ///
    /// Returns `(requeued, failed)`.
    pub async fn reclaim_stale(
        &self,
        stale_before: DateTime<Utc>,
        max_attempts: i64,
    ) -> Result<(usize, usize)> {
        let now = Utc::now().to_rfc3339();
        let cutoff = stale_before.to_rfc3339();

        let counts = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let failed = tx.execute(
                    "UPDATE jobs SET state = 'failed', last_error = ?1, updated_at = ?2
                     WHERE state IN ('claimed', 'generating')
                       AND updated_at < ?3
                       AND attempt_count >= ?4",
                    params!["worker stalled past staleness threshold", now, cutoff, max_attempts],
                )?;

                let requeued = tx.execute(
                    "UPDATE jobs
                     SET state = 'pending', attempt_count = attempt_count + 1,
                         claimed_at = NULL, next_attempt_at = NULL,
                         last_error = ?1, updated_at = ?2
                     WHERE state IN ('claimed', 'generating')
                       AND updated_at < ?3",
                    params!["reclaimed after worker stall", now, cutoff],
                )?;

                tx.commit()?;
                Ok((requeued, failed))
            })
            .await?;

        Ok(counts)
    }

    // Notifier queries

    /// Terminal jobs whose outcome has not been announced yet, oldest
    /// outcome first.
    pub async fn unnotified_terminal_jobs(
        &self,
        limit: i64,
    ) -> Result<Vec<(Job, Trend, Option<Short>)>> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, trend_id, state, attempt_count, last_error, next_attempt_at,
                            claimed_at, notified_at, created_at, updated_at
                     FROM jobs
                     WHERE state IN ('completed', 'failed') AND notified_at IS NULL
                     ORDER BY updated_at ASC, id ASC
                     LIMIT ?1",
                )?;
                let jobs = stmt
                    .query_map(params![limit], |row| Ok(job_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                let mut out = Vec::with_capacity(jobs.len());
                for job in jobs {
                    let trend = conn.query_row(
                        "SELECT id, video_id, title, channel, score, discovered_at
                         FROM trends WHERE id = ?1",
                        params![job.trend_id],
                        |row| Ok(trend_from_row(row)),
                    )?;
                    let short = conn
                        .query_row(
                            "SELECT id, job_id, asset_path, script_text, created_at
                             FROM shorts WHERE job_id = ?1",
                            params![job.id],
                            |row| Ok(short_from_row(row)),
                        )
                        .optional()?;
                    out.push((job, trend, short));
                }
                Ok(out)
            })
            .await?;

        Ok(rows)
    }

    /// Mark a terminal job announced. Conditional on the mark being
    /// unset, so concurrent announcers dedup against each other.
    pub async fn mark_notified(&self, job_id: i64) -> Result<bool> {
        let now = Utc::now().to_rfc3339();

        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE jobs SET notified_at = ?1 WHERE id = ?2 AND notified_at IS NULL",
                    params![now, job_id],
                )?;
                Ok(updated > 0)
            })
            .await?;

        Ok(updated)
    }

    // Metrics

    pub async fn record_metric(
        &self,
        job_id: i64,
        stage: Stage,
        duration_ms: u64,
        outcome: StageOutcome,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO metrics (job_id, stage, duration_ms, outcome, recorded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![job_id, stage.as_str(), duration_ms as i64, outcome.as_str(), now],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_stats(&self) -> Result<DashboardStats> {
        let stats = self
            .conn
            .call(|conn| {
                let total_trends: i64 =
                    conn.query_row("SELECT COUNT(*) FROM trends", [], |row| row.get(0))?;
                let pending_jobs: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM jobs WHERE state = 'pending'",
                    [],
                    |row| row.get(0),
                )?;
                let completed_jobs: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM jobs WHERE state = 'completed'",
                    [],
                    |row| row.get(0),
                )?;
                let failed_jobs: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM jobs WHERE state = 'failed'",
                    [],
                    |row| row.get(0),
                )?;

                Ok(DashboardStats {
                    total_trends,
                    pending_jobs,
                    completed_jobs,
                    failed_jobs,
                })
            })
            .await?;

        Ok(stats)
    }

    #[cfg(test)]
    pub async fn get_job(&self, job_id: i64) -> Result<Option<Job>> {
        let job = self
            .conn
            .call(move |conn| {
                let job = conn
                    .query_row(
                        "SELECT id, trend_id, state, attempt_count, last_error, next_attempt_at,
                                claimed_at, notified_at, created_at, updated_at
                         FROM jobs WHERE id = ?1",
                        params![job_id],
                        |row| Ok(job_from_row(row)),
                    )
                    .optional()?;
                Ok(job)
            })
            .await?;
        Ok(job)
    }

    #[cfg(test)]
    pub async fn clear_backoff(&self, job_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE jobs SET next_attempt_at = NULL WHERE id = ?1",
                    params![job_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn metric_count(
        &self,
        job_id: i64,
        stage: Stage,
        outcome: StageOutcome,
    ) -> Result<i64> {
        let count = self
            .conn
            .call(move |conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM metrics WHERE job_id = ?1 AND stage = ?2 AND outcome = ?3",
                    params![job_id, stage.as_str(), outcome.as_str()],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    #[cfg(test)]
    pub async fn get_short_for_job(&self, job_id: i64) -> Result<Option<Short>> {
        let short = self
            .conn
            .call(move |conn| {
                let short = conn
                    .query_row(
                        "SELECT id, job_id, asset_path, script_text, created_at
                         FROM shorts WHERE job_id = ?1",
                        params![job_id],
                        |row| Ok(short_from_row(row)),
                    )
                    .optional()?;
                Ok(short)
            })
            .await?;
        Ok(short)
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // RFC3339 first (what the pipeline writes), then SQLite's own
    // datetime format (schema defaults).
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn job_from_row(row: &Row) -> Job {
    Job {
        id: row.get(0).unwrap(),
        trend_id: row.get(1).unwrap(),
        state: JobState::from_str(&row.get::<_, String>(2).unwrap()),
        attempt_count: row.get(3).unwrap(),
        last_error: row.get(4).unwrap(),
        next_attempt_at: row
            .get::<_, Option<String>>(5)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
        claimed_at: row
            .get::<_, Option<String>>(6)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
        notified_at: row
            .get::<_, Option<String>>(7)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
        created_at: row
            .get::<_, String>(8)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        updated_at: row
            .get::<_, String>(9)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

fn trend_from_row(row: &Row) -> Trend {
    Trend {
        id: row.get(0).unwrap(),
        video_id: row.get(1).unwrap(),
        title: row.get(2).unwrap(),
        channel: row.get(3).unwrap(),
        score: row.get(4).unwrap(),
        discovered_at: row
            .get::<_, String>(5)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

fn short_from_row(row: &Row) -> Short {
    Short {
        id: row.get(0).unwrap(),
        job_id: row.get(1).unwrap(),
        asset_path: row.get(2).unwrap(),
        script_text: row.get(3).unwrap(),
        created_at: row
            .get::<_, String>(4)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;

    async fn test_repo() -> (Repository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let repo = Repository::new(path.to_str().unwrap()).await.unwrap();
        (repo, dir)
    }

    fn sample_trend(n: u32) -> NewTrend {
        NewTrend {
            video_id: format!("video-{}", n),
            title: format!("Trending topic {}", n),
            channel: Some("Some Channel".to_string()),
            score: 1_000 * n as i64,
        }
    }

    #[tokio::test]
    async fn duplicate_trend_is_a_noop() {
        let (repo, _dir) = test_repo().await;

        let first = repo.insert_trend_with_job(sample_trend(1)).await.unwrap();
        let second = repo.insert_trend_with_job(sample_trend(1)).await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());

        let stats = repo.get_stats().await.unwrap();
        assert_eq!(stats.total_trends, 1);
        assert_eq!(stats.pending_jobs, 1);
    }

    #[tokio::test]
    async fn claim_is_oldest_first_and_exclusive() {
        let (repo, _dir) = test_repo().await;

        let first_job = repo
            .insert_trend_with_job(sample_trend(1))
            .await
            .unwrap()
            .unwrap();
        let second_job = repo
            .insert_trend_with_job(sample_trend(2))
            .await
            .unwrap()
            .unwrap();

        let (job_a, trend_a) = repo.claim_next().await.unwrap().unwrap();
        assert_eq!(job_a.id, first_job);
        assert_eq!(job_a.state, JobState::Claimed);
        assert_eq!(trend_a.video_id, "video-1");

        let (job_b, _) = repo.claim_next().await.unwrap().unwrap();
        assert_eq!(job_b.id, second_job);

        assert!(repo.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_claims_never_share_a_job() {
        let (repo, _dir) = test_repo().await;
        let repo = Arc::new(repo);

        for n in 1..=3 {
            repo.insert_trend_with_job(sample_trend(n)).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.claim_next().await.unwrap().map(|(job, _)| job.id)
            }));
        }

        let mut claimed = Vec::new();
        for handle in handles {
            if let Some(id) = handle.await.unwrap() {
                claimed.push(id);
            }
        }

        claimed.sort_unstable();
        let before_dedup = claimed.len();
        claimed.dedup();
        assert_eq!(before_dedup, claimed.len(), "a job was claimed twice");
        assert_eq!(claimed.len(), 3);
    }

    #[tokio::test]
    async fn backoff_deadline_gates_eligibility() {
        let (repo, _dir) = test_repo().await;

        let job_id = repo
            .insert_trend_with_job(sample_trend(1))
            .await
            .unwrap()
            .unwrap();

        let (job, _) = repo.claim_next().await.unwrap().unwrap();
        assert!(repo.mark_generating(job.id).await.unwrap());
        repo.retry_job(job.id, "timeout".to_string(), Utc::now() + Duration::hours(1))
            .await
            .unwrap();

        // Still backing off.
        assert!(repo.claim_next().await.unwrap().is_none());

        // Move the deadline into the past; the job becomes claimable again.
        repo.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE jobs SET next_attempt_at = ?1 WHERE id = ?2",
                    params![(Utc::now() - Duration::hours(1)).to_rfc3339(), job_id],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let (job, _) = repo.claim_next().await.unwrap().unwrap();
        assert_eq!(job.id, job_id);
        assert_eq!(job.state, JobState::Claimed);
    }

    #[tokio::test]
    async fn retry_bound_reaches_failed_after_max_attempts() {
        let (repo, _dir) = test_repo().await;
        let max_attempts = 3;

        let job_id = repo
            .insert_trend_with_job(sample_trend(1))
            .await
            .unwrap()
            .unwrap();

        for attempt in 1..=max_attempts {
            let (job, _) = repo.claim_next().await.unwrap().unwrap();
            assert_eq!(job.id, job_id);
            assert!(repo.mark_generating(job.id).await.unwrap());

            let job = repo.get_job(job_id).await.unwrap().unwrap();
            assert_eq!(job.attempt_count, attempt);

            if job.attempt_count >= max_attempts {
                assert!(repo.fail_job(job.id, "gave up".to_string()).await.unwrap());
            } else {
                assert!(repo
                    .retry_job(job.id, "timeout".to_string(), Utc::now() - Duration::seconds(1))
                    .await
                    .unwrap());
            }
        }

        let job = repo.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempt_count, max_attempts);
        assert_eq!(job.last_error.as_deref(), Some("gave up"));

        // Terminal: nothing left to claim.
        assert!(repo.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn short_exists_iff_job_completed() {
        let (repo, _dir) = test_repo().await;

        let job_id = repo
            .insert_trend_with_job(sample_trend(1))
            .await
            .unwrap()
            .unwrap();

        // Completion requires the generating state.
        assert!(!repo
            .complete_job(job_id, "a.mp4".to_string(), "script".to_string())
            .await
            .unwrap());
        assert!(repo.get_short_for_job(job_id).await.unwrap().is_none());

        let (job, _) = repo.claim_next().await.unwrap().unwrap();
        assert!(repo.mark_generating(job.id).await.unwrap());
        assert!(repo
            .complete_job(job.id, "a.mp4".to_string(), "script".to_string())
            .await
            .unwrap());

        let job = repo.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);

        let short = repo.get_short_for_job(job_id).await.unwrap().unwrap();
        assert_eq!(short.asset_path, "a.mp4");

        // A second completion must not produce a second short.
        assert!(!repo
            .complete_job(job_id, "b.mp4".to_string(), "other".to_string())
            .await
            .unwrap());
        let short = repo.get_short_for_job(job_id).await.unwrap().unwrap();
        assert_eq!(short.asset_path, "a.mp4");
    }

    #[tokio::test]
    async fn reclaim_returns_stale_claims_to_pending() {
        let (repo, _dir) = test_repo().await;

        let job_id = repo
            .insert_trend_with_job(sample_trend(1))
            .await
            .unwrap()
            .unwrap();
        repo.claim_next().await.unwrap().unwrap();

        // Cutoff in the future: everything in flight counts as stale.
        let (requeued, failed) = repo
            .reclaim_stale(Utc::now() + Duration::hours(1), 3)
            .await
            .unwrap();
        assert_eq!((requeued, failed), (1, 0));

        let job = repo.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempt_count, 1);
        assert!(job.claimed_at.is_none());
    }

    #[tokio::test]
    async fn reclaim_fails_jobs_out_of_attempts() {
        let (repo, _dir) = test_repo().await;

        let job_id = repo
            .insert_trend_with_job(sample_trend(1))
            .await
            .unwrap()
            .unwrap();

        // Burn the attempt budget through the normal transition path.
        for _ in 0..3 {
            let (job, _) = repo.claim_next().await.unwrap().unwrap();
            repo.mark_generating(job.id).await.unwrap();
            repo.retry_job(job.id, "timeout".to_string(), Utc::now() - Duration::seconds(1))
                .await
                .unwrap();
        }
        let (job, _) = repo.claim_next().await.unwrap().unwrap();
        assert_eq!(job.attempt_count, 3);

        let (requeued, failed) = repo
            .reclaim_stale(Utc::now() + Duration::hours(1), 3)
            .await
            .unwrap();
        assert_eq!((requeued, failed), (0, 1));

        let job = repo.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
    }

    #[tokio::test]
    async fn notification_marks_dedup() {
        let (repo, _dir) = test_repo().await;

        let job_id = repo
            .insert_trend_with_job(sample_trend(1))
            .await
            .unwrap()
            .unwrap();
        let (job, _) = repo.claim_next().await.unwrap().unwrap();
        repo.mark_generating(job.id).await.unwrap();
        repo.complete_job(job.id, "a.mp4".to_string(), "script".to_string())
            .await
            .unwrap();

        let unnotified = repo.unnotified_terminal_jobs(10).await.unwrap();
        assert_eq!(unnotified.len(), 1);
        let (job, trend, short) = &unnotified[0];
        assert_eq!(job.id, job_id);
        assert_eq!(trend.video_id, "video-1");
        assert!(short.is_some());

        assert!(repo.mark_notified(job_id).await.unwrap());
        assert!(!repo.mark_notified(job_id).await.unwrap());
        assert!(repo.unnotified_terminal_jobs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn config_round_trip_normalizes_credentials() {
        let (repo, _dir) = test_repo().await;

        // Defaults before anything is saved.
        let config = repo.load_config().await.unwrap();
        assert_eq!(config, Config::default());

        repo.save_config(Config {
            youtube_api_key: Some("  ".to_string()),
            telegram_bot_token: Some("token-123".to_string()),
            telegram_chat_id: None,
            ollama_endpoint: "http://127.0.0.1:11434".to_string(),
            poll_interval_secs: 120,
        })
        .await
        .unwrap();

        let config = repo.load_config().await.unwrap();
        assert_eq!(config.youtube_api_key, None);
        assert_eq!(config.telegram_bot_token, Some("token-123".to_string()));
        assert_eq!(config.ollama_endpoint, "http://127.0.0.1:11434");
        assert_eq!(config.poll_interval_secs, 120);
    }

    #[tokio::test]
    async fn metrics_append_and_stats_aggregate() {
        let (repo, _dir) = test_repo().await;

        let job_id = repo
            .insert_trend_with_job(sample_trend(1))
            .await
            .unwrap()
            .unwrap();
        repo.insert_trend_with_job(sample_trend(2)).await.unwrap();

        repo.record_metric(job_id, Stage::Script, 1_200, StageOutcome::Success)
            .await
            .unwrap();
        repo.record_metric(job_id, Stage::Assemble, 8_000, StageOutcome::Failure)
            .await
            .unwrap();

        let (job, _) = repo.claim_next().await.unwrap().unwrap();
        repo.mark_generating(job.id).await.unwrap();
        repo.fail_job(job.id, "permanent".to_string()).await.unwrap();

        let stats = repo.get_stats().await.unwrap();
        assert_eq!(stats.total_trends, 2);
        assert_eq!(stats.pending_jobs, 1);
        assert_eq!(stats.completed_jobs, 0);
        assert_eq!(stats.failed_jobs, 1);
    }
}
