//! Retry policy for failed delivery attempts.

use std::time::{Duration, SystemTime};

use herald_common::{EmailJob, job::DEFAULT_MAX_RETRIES};
use serde::Deserialize;

use crate::queue::retry::calculate_retry_delay;

/// What to do with a job whose attempt just failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue, eligible again at the given instant
    RetryAt(SystemTime),
    /// Attempts exhausted; dead-letter the job
    GiveUp,
}

/// Backoff configuration and the retry bound for new jobs
///
/// `max_retries` counts retries beyond the first attempt, so a job with
/// `max_retries = 3` is sent at most 4 times.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryPolicy {
    /// Bound given to jobs created without one
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Delay after the first failure; doubles with every further failure
    ///
    /// Default: 60 000 ms (1 minute)
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on the backoff
    ///
    /// Default: 3 600 000 ms (1 hour)
    #[serde(default = "defaults::max_delay_ms")]
    pub max_delay_ms: u64,

    /// Random extra delay as a fraction of the backoff, spreading out retries
    /// of jobs that failed together
    ///
    /// Default: 0.1 (up to +10%)
    #[serde(default = "defaults::jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            base_delay_ms: defaults::base_delay_ms(),
            max_delay_ms: defaults::max_delay_ms(),
            jitter_factor: defaults::jitter_factor(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Backoff after attempt number `attempt` (1-indexed) failed
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_retry_delay(
            attempt,
            self.base_delay(),
            self.max_delay(),
            self.jitter_factor,
        )
    }

    /// Decide the fate of a job whose current attempt failed at `now`
    #[must_use]
    pub fn decide(&self, job: &EmailJob, now: SystemTime) -> RetryDecision {
        if job.attempts_exhausted() {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAt(now + self.delay_for(job.attempts))
        }
    }
}

mod defaults {
    use super::DEFAULT_MAX_RETRIES;

    pub const fn max_retries() -> u32 {
        DEFAULT_MAX_RETRIES
    }

    pub const fn base_delay_ms() -> u64 {
        60_000
    }

    pub const fn max_delay_ms() -> u64 {
        3_600_000
    }

    pub const fn jitter_factor() -> f64 {
        0.1
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use herald_common::{JobContent, JobKind};
    use pretty_assertions::assert_eq;

    use super::*;

    fn failing_job(attempts: u32, max_retries: u32) -> EmailJob {
        let mut job = EmailJob::new(
            JobKind::General,
            vec!["a@example.com".to_string()],
            JobContent::template("t"),
        );
        job.attempts = attempts;
        job.max_retries = max_retries;
        job
    }

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn retries_until_bound_is_exceeded() {
        let policy = no_jitter();
        let now = SystemTime::now();

        assert_eq!(
            policy.decide(&failing_job(1, 1), now),
            RetryDecision::RetryAt(now + Duration::from_secs(60))
        );
        assert_eq!(policy.decide(&failing_job(2, 1), now), RetryDecision::GiveUp);
    }

    #[test]
    fn zero_retries_means_one_attempt() {
        let policy = no_jitter();
        assert_eq!(
            policy.decide(&failing_job(1, 0), SystemTime::now()),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn backoff_grows_between_attempts() {
        let policy = no_jitter();
        let first = policy.delay_for(1);
        let second = policy.delay_for(2);

        assert!(first >= Duration::from_secs(60));
        assert!(second >= Duration::from_secs(120));
        assert_eq!(second, first * 2);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let policy: RetryPolicy = ron::from_str("(base_delay_ms: 10)").unwrap();
        assert_eq!(policy.base_delay(), Duration::from_millis(10));
        assert_eq!(policy.max_retries, DEFAULT_MAX_RETRIES);
    }
}
