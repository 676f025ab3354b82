//! Pipeline policy constants.
//!
//! These are engineering knobs, not user settings; they are deliberately
//! kept out of the stored Config.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Attempts a job may consume before it becomes terminally failed.
pub const MAX_ATTEMPTS: i64 = 3;

/// Base delay for the job retry backoff; doubles per attempt.
pub const BACKOFF_BASE: Duration = Duration::from_secs(30);

/// Ceiling for the job retry backoff.
pub const BACKOFF_CAP: Duration = Duration::from_secs(15 * 60);

/// A claimed/generating job untouched for this long is presumed lost.
pub const STALE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Cadence of the stale-job sweep.
pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(60);

/// Size of the generation worker pool.
pub const WORKER_COUNT: usize = 2;

/// Worker sleep between claim attempts when the queue is empty.
pub const CLAIM_IDLE_BACKOFF: Duration = Duration::from_secs(5);

/// The trend source is rate limited; never poll faster than this.
pub const POLL_INTERVAL_FLOOR_SECS: u64 = 60;

/// Upper bound on trending items ingested per poll.
pub const MAX_TRENDS_PER_POLL: usize = 10;

/// Delivery attempts per announcement, independent of the job budget.
pub const NOTIFY_MAX_ATTEMPTS: u32 = 3;

/// Base delay for announcement delivery retries.
pub const NOTIFY_BACKOFF_BASE: Duration = Duration::from_secs(5);

/// Cadence of the notifier's store poll.
pub const NOTIFY_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Batch size per notifier cycle.
pub const NOTIFY_BATCH_SIZE: i64 = 10;

/// Delay before a retried attempt becomes eligible again.
pub fn backoff_delay(attempt: i64) -> Duration {
    let exp = attempt.clamp(0, 16) as u32;
    BACKOFF_BASE
        .saturating_mul(2u32.saturating_pow(exp))
        .min(BACKOFF_CAP)
}

/// Claim-eligibility deadline for a job that just failed its Nth attempt.
pub fn backoff_deadline(now: DateTime<Utc>, attempt: i64) -> DateTime<Utc> {
    now + chrono::Duration::seconds(backoff_delay(attempt).as_secs() as i64)
}

/// Delivery backoff for the notifier's own retry loop.
pub fn notify_backoff_delay(attempt: u32) -> Duration {
    NOTIFY_BACKOFF_BASE
        .saturating_mul(2u32.saturating_pow(attempt.min(8)))
        .min(BACKOFF_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(0), Duration::from_secs(30));
        assert_eq!(backoff_delay(1), Duration::from_secs(60));
        assert_eq!(backoff_delay(2), Duration::from_secs(120));
    }

    #[test]
    fn backoff_is_monotonic_up_to_the_cap() {
        let mut previous = Duration::ZERO;
        for attempt in 0..32 {
            let delay = backoff_delay(attempt);
            assert!(delay >= previous, "backoff shrank at attempt {}", attempt);
            assert!(delay <= BACKOFF_CAP);
            previous = delay;
        }
        assert_eq!(backoff_delay(31), BACKOFF_CAP);
    }

    #[test]
    fn deadline_lands_in_the_future() {
        let now = Utc::now();
        let deadline = backoff_deadline(now, 1);
        assert_eq!((deadline - now).num_seconds(), 60);
    }

    #[test]
    fn notify_backoff_is_capped() {
        assert_eq!(notify_backoff_delay(0), Duration::from_secs(5));
        assert_eq!(notify_backoff_delay(1), Duration::from_secs(10));
        assert!(notify_backoff_delay(30) <= BACKOFF_CAP);
    }
}
