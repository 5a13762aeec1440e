//! Decision model: what happens to a job whose attempt did not complete.
//!
//! The same decision applies to a worker-reported failure and to a reaped
//! lease, so both paths share one retry/dead-letter policy.

use chrono::{DateTime, Duration, Utc};

use super::job::JobRecord;
use super::retry::RetryPolicy;

/// The next action for a job whose attempt failed or was abandoned.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Back to pending, claimable again at `run_at`.
    Requeue { run_at: DateTime<Utc> },

    /// Attempts exhausted: terminal `failed`.
    DeadLetter,
}

/// Attempt-based retry decisions.
///
/// Pure: reads the record, never mutates it. Applying the decision is the
/// store's job.
#[derive(Debug, Clone, Default)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// A worker reported `failed`. An explicit backoff overrides the policy.
    pub fn on_failure(
        &self,
        job: &JobRecord,
        explicit_backoff: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Decision {
        if job.attempts >= job.max_attempts {
            return Decision::DeadLetter;
        }
        let delay = explicit_backoff.unwrap_or_else(|| self.retry_policy.next_delay(job.attempts));
        Decision::Requeue { run_at: now + delay }
    }

    /// The reaper recovered an expired lease. The abandoned execution was
    /// charged at claim time, so the ceiling check matches `on_failure`.
    pub fn on_reap(&self, job: &JobRecord, requeue_delay: Duration, now: DateTime<Utc>) -> Decision {
        if job.attempts >= job.max_attempts {
            Decision::DeadLetter
        } else {
            Decision::Requeue { run_at: now + requeue_delay }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobId, JobType};
    use chrono::TimeZone;
    use ulid::Ulid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn job(attempts: u32, max_attempts: u32) -> JobRecord {
        let mut job = JobRecord::new(
            JobId::from_ulid(Ulid::new()),
            JobType::new("ingestion").unwrap(),
            serde_json::json!({}),
            0,
            now(),
            max_attempts,
            1,
            now(),
        );
        job.attempts = attempts;
        job
    }

    #[test]
    fn failure_with_attempts_left_requeues_with_policy_backoff() {
        let decider = DefaultDecider::default();
        let decision = decider.on_failure(&job(2, 5), None, now());
        assert_eq!(
            decision,
            Decision::Requeue { run_at: now() + Duration::seconds(60) }
        );
    }

    #[test]
    fn explicit_backoff_wins() {
        let decider = DefaultDecider::default();
        let decision = decider.on_failure(&job(1, 5), Some(Duration::seconds(7)), now());
        assert_eq!(decision, Decision::Requeue { run_at: now() + Duration::seconds(7) });
    }

    #[test]
    fn failure_at_ceiling_dead_letters() {
        let decider = DefaultDecider::default();
        assert_eq!(decider.on_failure(&job(5, 5), None, now()), Decision::DeadLetter);
    }

    #[test]
    fn reap_uses_requeue_delay() {
        let decider = DefaultDecider::default();
        assert_eq!(
            decider.on_reap(&job(2, 5), Duration::zero(), now()),
            Decision::Requeue { run_at: now() }
        );
        assert_eq!(decider.on_reap(&job(5, 5), Duration::zero(), now()), Decision::DeadLetter);
    }
}
