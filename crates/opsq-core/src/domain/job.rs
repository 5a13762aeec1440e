//! Job record: the single source of truth for one unit of work.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::JobId;
use super::job_type::JobType;
use super::state::JobStatus;

/// Prefix written in front of `last_error` when a job is dead-lettered.
pub const DEAD_LETTER_MARKER: &str = "[DEAD_LETTER] ";

/// Default bound on stored error text, in characters.
pub const DEFAULT_MAX_ERROR_LEN: usize = 2000;

/// Bound error text to `max_chars` characters without splitting a char.
pub fn truncate_error(error: &str, max_chars: usize) -> String {
    match error.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => error[..byte_idx].to_string(),
        None => error.to_string(),
    }
}

/// One job row.
///
/// Records handed out by a store are copies; mutating one changes nothing
/// in the store. The transition methods are crate-private so only the
/// store implementations drive state changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub status: JobStatus,

    /// Tie-break between rows created at the same instant; higher first.
    pub priority: i32,

    /// Earliest instant the row may be claimed.
    pub run_at: DateTime<Utc>,

    /// Number of leases taken (plus reaps). Never exceeds `max_attempts`.
    pub attempts: u32,
    pub max_attempts: u32,

    /// Set while a worker holds the lease.
    pub locked_at: Option<DateTime<Utc>>,

    /// Current or last lease holder.
    pub worker_id: Option<String>,

    pub last_error: Option<String>,

    /// How many times the reaper recovered this job from a dead worker.
    pub reap_count: u32,

    /// Store-assigned insertion order, the final ordering tie-break.
    pub seq: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: JobId,
        job_type: JobType,
        payload: serde_json::Value,
        priority: i32,
        run_at: DateTime<Utc>,
        max_attempts: u32,
        seq: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            job_type,
            payload,
            status: JobStatus::Pending,
            priority,
            run_at,
            attempts: 0,
            max_attempts,
            locked_at: None,
            worker_id: None,
            last_error: None,
            reap_count: 0,
            seq,
            created_at: now,
            updated_at: now,
        }
    }

    /// A processing row whose lease started strictly before `now - lease`.
    pub fn lease_expired(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        self.status == JobStatus::Processing
            && self.locked_at.is_some_and(|locked_at| locked_at < now - lease)
    }

    /// Eligible for `claim_pending_job`?
    ///
    /// Pending rows qualify once `run_at` has passed. Processing rows with an
    /// expired lease qualify only while attempts remain; exhausted ones are
    /// left for the reaper to dead-letter.
    pub fn is_claimable(&self, job_types: &[JobType], now: DateTime<Utc>, lease: Duration) -> bool {
        if !job_types.contains(&self.job_type) {
            return false;
        }
        match self.status {
            JobStatus::Pending => self.run_at <= now,
            JobStatus::Processing => {
                self.lease_expired(now, lease) && self.attempts < self.max_attempts
            }
            JobStatus::Completed | JobStatus::Failed => false,
        }
    }

    /// Dead letters are `failed` rows; the attempt count or the error
    /// marker identifies them.
    pub fn is_dead_lettered(&self) -> bool {
        self.status == JobStatus::Failed
            && (self.attempts >= self.max_attempts
                || self
                    .last_error
                    .as_deref()
                    .is_some_and(|e| e.starts_with(DEAD_LETTER_MARKER)))
    }

    /// Claim order: oldest first, then higher priority, then insertion order.
    pub fn claim_order(&self) -> (DateTime<Utc>, std::cmp::Reverse<i32>, u64) {
        (self.created_at, std::cmp::Reverse(self.priority), self.seq)
    }

    pub fn claimed(&self) -> ClaimedJob {
        ClaimedJob {
            id: self.id,
            job_type: self.job_type.clone(),
            payload: self.payload.clone(),
            attempts: self.attempts,
            created_at: self.created_at,
        }
    }

    /// Take the lease (pending or expired processing -> processing).
    pub(crate) fn start_attempt(&mut self, worker_id: &str, now: DateTime<Utc>) {
        self.status = JobStatus::Processing;
        self.locked_at = Some(now);
        self.worker_id = Some(worker_id.to_string());
        self.attempts += 1;
        self.updated_at = now;
    }

    pub(crate) fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.locked_at = None;
        self.updated_at = now;
    }

    /// Back to pending, eligible again at `run_at`.
    pub(crate) fn requeue(&mut self, run_at: DateTime<Utc>, error: Option<String>, now: DateTime<Utc>) {
        self.status = JobStatus::Pending;
        self.locked_at = None;
        self.run_at = run_at;
        if error.is_some() {
            self.last_error = error;
        }
        self.updated_at = now;
    }

    pub(crate) fn mark_dead_lettered(&mut self, error: &str, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.locked_at = None;
        self.last_error = Some(format!("{DEAD_LETTER_MARKER}{error}"));
        self.updated_at = now;
    }

    /// Count a reap. The abandoned execution was already charged to
    /// `attempts` when it was claimed, so only `reap_count` moves.
    pub(crate) fn record_reap(&mut self) {
        self.reap_count += 1;
    }
}

/// What a successful claim returns to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimedJob {
    pub id: JobId,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn record(job_type: &str) -> JobRecord {
        JobRecord::new(
            JobId::from_ulid(Ulid::new()),
            JobType::new(job_type).unwrap(),
            serde_json::json!({"n": 1}),
            0,
            t0(),
            3,
            1,
            t0(),
        )
    }

    #[test]
    fn truncate_error_respects_char_boundaries() {
        assert_eq!(truncate_error("héllo", 2), "hé");
        assert_eq!(truncate_error("short", 100), "short");
        assert_eq!(truncate_error("", 3), "");
    }

    #[test]
    fn pending_is_claimable_only_after_run_at() {
        let mut job = record("ingestion");
        job.run_at = t0() + Duration::seconds(10);
        let types = [JobType::new("ingestion").unwrap()];
        let lease = Duration::minutes(5);

        assert!(!job.is_claimable(&types, t0(), lease));
        assert!(job.is_claimable(&types, t0() + Duration::seconds(10), lease));
    }

    #[test]
    fn other_types_are_not_claimable() {
        let job = record("ingestion");
        let types = [JobType::new("enrichment").unwrap()];
        assert!(!job.is_claimable(&types, t0(), Duration::minutes(5)));
    }

    #[test]
    fn expired_lease_is_strictly_older_than_timeout() {
        let mut job = record("ingestion");
        job.start_attempt("w1", t0());
        let lease = Duration::minutes(1);

        assert!(!job.lease_expired(t0() + Duration::minutes(1), lease));
        assert!(job.lease_expired(t0() + Duration::minutes(1) + Duration::seconds(1), lease));
    }

    #[test]
    fn expired_lease_with_no_attempts_left_is_not_claimable() {
        let mut job = record("ingestion");
        job.max_attempts = 1;
        job.start_attempt("w1", t0());
        let types = [JobType::new("ingestion").unwrap()];
        assert!(!job.is_claimable(&types, t0() + Duration::hours(1), Duration::minutes(1)));
    }

    #[test]
    fn start_attempt_sets_lease_fields() {
        let mut job = record("ingestion");
        job.start_attempt("w1", t0());
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.locked_at, Some(t0()));
        assert_eq!(job.worker_id.as_deref(), Some("w1"));
        assert_eq!(job.attempts, 1);
    }

    #[test]
    fn dead_letter_is_marked() {
        let mut job = record("ingestion");
        job.start_attempt("w1", t0());
        job.mark_dead_lettered("boom", t0());
        assert!(job.is_dead_lettered());
        assert_eq!(job.last_error.as_deref(), Some("[DEAD_LETTER] boom"));
        assert_eq!(job.locked_at, None);
    }

    #[test]
    fn reap_counts_without_charging_another_attempt() {
        let mut job = record("ingestion");
        job.start_attempt("w1", t0());
        job.record_reap();
        assert_eq!(job.attempts, 1);
        assert_eq!(job.reap_count, 1);
    }

    #[test]
    fn claim_order_prefers_older_then_higher_priority() {
        let mut a = record("ingestion");
        let mut b = record("ingestion");
        b.seq = 2;
        assert!(a.claim_order() < b.claim_order());

        b.priority = 10;
        assert!(b.claim_order() < a.claim_order());

        a.created_at = t0() - Duration::seconds(1);
        assert!(a.claim_order() < b.claim_order());
    }
}
