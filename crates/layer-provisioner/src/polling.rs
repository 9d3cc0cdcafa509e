//! Deadline-bounded waits: build status polling and artifact fetch retry.
//!
//! Both loops take an explicit `tokio::time::Instant` deadline and never
//! sleep past it, so a paused tokio clock drives them in tests.

use std::time::Duration;

use layer_clients::{ArtifactStore, BuildJob, BuildService, BuildStatus};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::{
    DEFAULT_FETCH_ATTEMPTS, DEFAULT_FETCH_BACKOFF_SECS, DEFAULT_MAX_POLL_ERRORS,
    DEFAULT_POLL_INTERVAL_SECS,
};
use crate::domain::{ProvisionError, Result};

/// How often to ask the build service for status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// A run of this many failed status calls ends the wait
    pub max_consecutive_errors: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_consecutive_errors: DEFAULT_MAX_POLL_ERRORS,
        }
    }
}

/// Bounded fixed-backoff retry for artifact reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls, including the first
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_FETCH_ATTEMPTS,
            backoff: Duration::from_secs(DEFAULT_FETCH_BACKOFF_SECS),
        }
    }
}

/// Poll `job_id` until it reaches a terminal status.
///
/// Polls immediately, then once per `policy.interval`. Returns the terminal
/// job whatever its status; judging success is the caller's business.
pub async fn wait_for_build(
    service: &dyn BuildService,
    job_id: &str,
    policy: PollPolicy,
    deadline: Instant,
) -> Result<BuildJob> {
    let error_limit = policy.max_consecutive_errors.max(1);
    let mut polls: u32 = 0;
    let mut consecutive_errors: u32 = 0;
    let mut last_status = BuildStatus::InProgress;

    loop {
        polls += 1;
        match service.poll(job_id).await {
            Ok(job) => {
                consecutive_errors = 0;
                debug!(
                    job_id = %job_id,
                    poll = polls,
                    status = %job.status,
                    phase = job.current_phase.as_deref().unwrap_or("-"),
                    "build status"
                );
                if job.status != last_status {
                    info!(
                        job_id = %job_id,
                        from = %last_status,
                        to = %job.status,
                        poll = polls,
                        "build status changed"
                    );
                    last_status = job.status;
                }
                if job.status.is_terminal() {
                    return Ok(job);
                }
            }
            Err(e) => {
                consecutive_errors += 1;
                warn!(
                    job_id = %job_id,
                    poll = polls,
                    consecutive_errors,
                    error = %e,
                    "build status check failed"
                );
                if consecutive_errors >= error_limit {
                    return Err(ProvisionError::BuildStatus {
                        job_id: job_id.to_string(),
                        errors: consecutive_errors,
                        source: e,
                    });
                }
            }
        }

        if passes_deadline(policy.interval, deadline) {
            return Err(ProvisionError::BuildDeadlineExceeded {
                job_id: job_id.to_string(),
                last_status,
                polls,
            });
        }
        sleep(policy.interval).await;
    }
}

/// Read `key`, retrying every error with a fixed backoff.
///
/// Makes at most `policy.attempts` calls and stops early rather than sleep
/// past `deadline`. `listed` is the discovery listing, kept for the error.
pub async fn fetch_with_retry(
    store: &dyn ArtifactStore,
    key: &str,
    policy: RetryPolicy,
    deadline: Instant,
    listed: &[String],
) -> Result<Vec<u8>> {
    let max_attempts = policy.attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        debug!(key = %key, attempt, max = max_attempts, "fetching artifact");
        match store.get(key).await {
            Ok(bytes) => {
                if attempt > 1 {
                    info!(key = %key, attempt, "artifact fetched after retry");
                }
                return Ok(bytes);
            }
            Err(e) => {
                warn!(key = %key, attempt, error = %e, "artifact fetch attempt failed");
                let out_of_time = passes_deadline(policy.backoff, deadline);
                if attempt >= max_attempts || out_of_time {
                    return Err(ProvisionError::Fetch {
                        key: key.to_string(),
                        attempts: attempt,
                        listed: listed.to_vec(),
                        source: e,
                    });
                }
            }
        }
        sleep(policy.backoff).await;
    }
}

/// Whether waiting `wait` from now would end after `deadline`.
///
/// A wait too long to represent as an instant passes every deadline.
fn passes_deadline(wait: Duration, deadline: Instant) -> bool {
    Instant::now()
        .checked_add(wait)
        .map_or(true, |resume| resume > deadline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use layer_clients::fakes::{MemoryArtifactStore, ScriptedBuildService, SCRIPTED_JOB_ID};

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_immediately_then_on_interval() {
        let service = ScriptedBuildService::succeeding_after(3);
        let start = Instant::now();

        let job = wait_for_build(&service, SCRIPTED_JOB_ID, PollPolicy::default(), far_deadline())
            .await
            .unwrap();

        assert_eq!(job.status, BuildStatus::Succeeded);
        assert_eq!(service.poll_calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_is_returned_not_raised() {
        let service = ScriptedBuildService::ending_with(2, BuildStatus::Stopped);
        let job = wait_for_build(&service, SCRIPTED_JOB_ID, PollPolicy::default(), far_deadline())
            .await
            .unwrap();
        assert_eq!(job.status, BuildStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_polling() {
        let service = ScriptedBuildService::new(vec![BuildStatus::InProgress]);
        let deadline = Instant::now() + Duration::from_secs(12);

        let err = wait_for_build(&service, SCRIPTED_JOB_ID, PollPolicy::default(), deadline)
            .await
            .unwrap_err();

        match err {
            ProvisionError::BuildDeadlineExceeded {
                last_status, polls, ..
            } => {
                assert_eq!(last_status, BuildStatus::InProgress);
                assert_eq!(polls, 3);
            }
            other => panic!("expected BuildDeadlineExceeded, got {other:?}"),
        }
        assert!(Instant::now() <= deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_are_tolerated() {
        let service = ScriptedBuildService::succeeding_after(1);
        service.fail_next_polls(2);

        let job = wait_for_build(&service, SCRIPTED_JOB_ID, PollPolicy::default(), far_deadline())
            .await
            .unwrap();
        assert_eq!(job.status, BuildStatus::Succeeded);
        assert_eq!(service.poll_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_poll_errors_surface() {
        let service = ScriptedBuildService::succeeding_after(1);
        service.fail_next_polls(10);

        let err = wait_for_build(&service, SCRIPTED_JOB_ID, PollPolicy::default(), far_deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::BuildStatus { errors: 3, .. }));
        assert_eq!(service.poll_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_succeeds_on_third_attempt() {
        let store = MemoryArtifactStore::new().with_object("build/xyz/layer.zip", b"layer");
        store.fail_next_gets(2);
        let start = Instant::now();

        let bytes = fetch_with_retry(
            &store,
            "build/xyz/layer.zip",
            RetryPolicy::default(),
            far_deadline(),
            &[],
        )
        .await
        .unwrap();

        assert_eq!(bytes, b"layer");
        assert_eq!(store.get_calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_gives_up_after_exact_attempts() {
        let store = MemoryArtifactStore::new();
        store.fail_all_gets();
        let listed = vec!["build/xyz/layer.zip".to_string()];

        let err = fetch_with_retry(
            &store,
            "build/xyz/layer.zip",
            RetryPolicy::default(),
            far_deadline(),
            &listed,
        )
        .await
        .unwrap_err();

        assert_eq!(store.get_calls(), 3);
        match err {
            ProvisionError::Fetch {
                key,
                attempts,
                listed: reported,
                ..
            } => {
                assert_eq!(key, "build/xyz/layer.zip");
                assert_eq!(attempts, 3);
                assert_eq!(reported, listed);
            }
            other => panic!("expected Fetch, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_never_sleeps_past_deadline() {
        let store = MemoryArtifactStore::new();
        store.fail_all_gets();
        let deadline = Instant::now() + Duration::from_secs(3);

        let err = fetch_with_retry(&store, "k", RetryPolicy::default(), deadline, &[])
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Fetch { attempts: 2, .. }));
        assert!(Instant::now() <= deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_interval_ends_wait_without_sleeping() {
        let service = ScriptedBuildService::new(vec![BuildStatus::InProgress]);
        let policy = PollPolicy {
            interval: Duration::MAX,
            ..PollPolicy::default()
        };
        let start = Instant::now();

        let err = wait_for_build(&service, SCRIPTED_JOB_ID, policy, far_deadline())
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::BuildDeadlineExceeded { polls: 1, .. }));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_backoff_stops_after_first_attempt() {
        let store = MemoryArtifactStore::new();
        store.fail_all_gets();
        let policy = RetryPolicy {
            attempts: 3,
            backoff: Duration::MAX,
        };

        let err = fetch_with_retry(&store, "k", policy, far_deadline(), &[])
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Fetch { attempts: 1, .. }));
        assert_eq!(store.get_calls(), 1);
    }
}
