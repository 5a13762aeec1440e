//! In-memory job store.
//!
//! One authoritative state behind a `tokio::sync::RwLock`. A claim works like
//! a compare-and-swap update against a candidate set:
//!
//! 1. under the read lock, collect a small batch of eligible rows in claim
//!    order and remember what each looked like;
//! 2. for each candidate, take the write lock and lease the row only if it
//!    is still exactly as observed and still eligible;
//! 3. if every candidate was taken by someone else, start a new round.
//!
//! No lock is held across the whole scan, and every lock acquisition is
//! bounded by `lock_wait`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::domain::{
    ClaimedJob, Decision, DefaultDecider, JobId, JobRecord, JobStatus, JobType, LivenessThresholds,
    WorkerHeartbeat, truncate_error,
};
use crate::error::QueueError;
use crate::observability::HealthReport;
use crate::ports::job_store::{
    check_job_types, check_payload, check_reportable, check_worker_id, lease_duration,
};
use crate::ports::{Clock, HealthViews, HeartbeatRegistry, IdGenerator, JobStore, SystemClock, UlidGenerator};

/// Stored when a worker reports `failed` without any text.
const NO_ERROR_TEXT: &str = "failed without an error message";

/// In-memory job table state.
#[derive(Default)]
struct JobTable {
    /// All job rows (single source of truth).
    jobs: HashMap<JobId, JobRecord>,

    /// Next insertion sequence number.
    next_seq: u64,
}

/// What a claimant saw when it picked a candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Observed {
    id: JobId,
    status: JobStatus,
    locked_at: Option<DateTime<Utc>>,
    attempts: u32,
}

impl Observed {
    fn of(job: &JobRecord) -> Self {
        Self {
            id: job.id,
            status: job.status,
            locked_at: job.locked_at,
            attempts: job.attempts,
        }
    }

    fn unchanged(&self, job: &JobRecord) -> bool {
        *self == Self::of(job)
    }
}

pub struct InMemoryJobStore {
    jobs: RwLock<JobTable>,
    /// Partitioned from `jobs`: heartbeat writers never wait on claims.
    heartbeats: RwLock<HashMap<String, WorkerHeartbeat>>,
    clock: Arc<dyn Clock>,
    ids: Box<dyn IdGenerator>,
    decider: DefaultDecider,
    config: QueueConfig,
    reap_requeue_delay: Duration,
}

impl InMemoryJobStore {
    pub fn new(config: QueueConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Use an explicit clock (tests pass a `FixedClock`).
    pub fn with_clock(config: QueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: RwLock::new(JobTable::default()),
            heartbeats: RwLock::new(HashMap::new()),
            ids: Box::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
            decider: DefaultDecider::new(config.retry.clone()),
            config,
            reap_requeue_delay: Duration::zero(),
        }
    }

    /// Delay before a reaped job becomes claimable again (default: none).
    pub fn with_reap_requeue_delay(mut self, delay: Duration) -> Self {
        self.reap_requeue_delay = delay.max(Duration::zero());
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn read_jobs(&self) -> Result<RwLockReadGuard<'_, JobTable>, QueueError> {
        let wait = self.config.lock_wait();
        tokio::time::timeout(wait, self.jobs.read())
            .await
            .map_err(|_| QueueError::StoreBusy(wait))
    }

    async fn write_jobs(&self) -> Result<RwLockWriteGuard<'_, JobTable>, QueueError> {
        let wait = self.config.lock_wait();
        tokio::time::timeout(wait, self.jobs.write())
            .await
            .map_err(|_| QueueError::StoreBusy(wait))
    }

    /// Candidate batch in claim order, observed under the read lock.
    async fn candidates(
        &self,
        job_types: &[JobType],
        lease: Duration,
    ) -> Result<Vec<Observed>, QueueError> {
        let table = self.read_jobs().await?;
        let now = self.clock.now();
        let mut eligible: Vec<&JobRecord> = table
            .jobs
            .values()
            .filter(|job| job.is_claimable(job_types, now, lease))
            .collect();
        eligible.sort_by_key(|job| job.claim_order());
        Ok(eligible
            .into_iter()
            .take(self.config.claim_batch_size.max(1))
            .map(Observed::of)
            .collect())
    }

    /// Compare-and-swap one candidate into `processing`.
    async fn try_lease(
        &self,
        candidate: &Observed,
        job_types: &[JobType],
        lease: Duration,
        worker_id: &str,
    ) -> Result<Option<ClaimedJob>, QueueError> {
        let mut table = self.write_jobs().await?;
        let now = self.clock.now();
        let Some(job) = table.jobs.get_mut(&candidate.id) else {
            return Ok(None);
        };
        if !candidate.unchanged(job) || !job.is_claimable(job_types, now, lease) {
            return Ok(None);
        }

        let previous_holder = job.worker_id.clone();
        let reclaimed = job.status == JobStatus::Processing;
        job.start_attempt(worker_id, now);
        if reclaimed {
            info!(
                job_id = %job.id,
                job_type = %job.job_type,
                worker_id,
                previous_worker = previous_holder.as_deref().unwrap_or("-"),
                attempts = job.attempts,
                "reclaimed expired lease"
            );
        } else {
            debug!(job_id = %job.id, job_type = %job.job_type, worker_id, attempts = job.attempts, "claimed job");
        }
        Ok(Some(job.claimed()))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn queue_job(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        priority: i32,
        run_at: Option<DateTime<Utc>>,
    ) -> Result<JobId, QueueError> {
        let job_type = JobType::new(job_type)?;
        check_payload(&payload)?;
        let max_attempts = self.config.max_attempts_for(job_type.as_str());

        let mut table = self.write_jobs().await?;
        let now = self.clock.now();
        let id = self.ids.generate_job_id();
        let seq = table.next_seq;
        table.next_seq += 1;

        let record = JobRecord::new(
            id,
            job_type,
            payload,
            priority,
            run_at.unwrap_or(now),
            max_attempts,
            seq,
            now,
        );
        debug!(job_id = %id, job_type = %record.job_type, priority, run_at = %record.run_at, "queued job");
        table.jobs.insert(id, record);
        Ok(id)
    }

    async fn claim_pending_job(
        &self,
        job_types: &[&str],
        lease_timeout_minutes: u32,
        worker_id: &str,
    ) -> Result<Option<ClaimedJob>, QueueError> {
        let job_types = check_job_types(job_types)?;
        check_worker_id(worker_id)?;
        let lease = lease_duration(lease_timeout_minutes)?;

        for round in 0..self.config.claim_rounds.max(1) {
            let candidates = match self.candidates(&job_types, lease).await {
                Ok(candidates) => candidates,
                Err(QueueError::StoreBusy(wait)) => {
                    debug!(worker_id, ?wait, "claim gave up waiting for the store");
                    return Ok(None);
                }
                Err(err) => return Err(err),
            };
            if candidates.is_empty() {
                return Ok(None);
            }

            for candidate in &candidates {
                match self.try_lease(candidate, &job_types, lease, worker_id).await {
                    Ok(Some(claimed)) => return Ok(Some(claimed)),
                    Ok(None) => continue,
                    Err(QueueError::StoreBusy(wait)) => {
                        debug!(worker_id, ?wait, "claim gave up waiting for the store");
                        return Ok(None);
                    }
                    Err(err) => return Err(err),
                }
            }
            debug!(worker_id, round, "every candidate was taken concurrently; retrying");
        }
        Ok(None)
    }

    async fn update_job_status(
        &self,
        job_id: JobId,
        status: JobStatus,
        error: Option<&str>,
        backoff_seconds: Option<u32>,
    ) -> Result<bool, QueueError> {
        check_reportable(status)?;
        let error = error.map(|e| truncate_error(e, self.config.max_error_len));

        let mut table = self.write_jobs().await?;
        let now = self.clock.now();
        let Some(job) = table.jobs.get_mut(&job_id) else {
            debug!(job_id = %job_id, %status, "status update for unknown job");
            return Ok(false);
        };
        if job.status != JobStatus::Processing {
            debug!(job_id = %job_id, %status, current = %job.status, "status update ignored: job is not processing");
            return Ok(false);
        }

        match status {
            JobStatus::Completed => {
                job.mark_completed(now);
                debug!(job_id = %job_id, job_type = %job.job_type, attempts = job.attempts, "job completed");
            }
            _ => {
                let error = error.unwrap_or_else(|| NO_ERROR_TEXT.to_string());
                let backoff = backoff_seconds.map(|secs| Duration::seconds(i64::from(secs)));
                match self.decider.on_failure(job, backoff, now) {
                    Decision::Requeue { run_at } => {
                        job.requeue(run_at, Some(error), now);
                        info!(
                            job_id = %job_id,
                            job_type = %job.job_type,
                            attempts = job.attempts,
                            max_attempts = job.max_attempts,
                            run_at = %run_at,
                            "job failed; requeued with backoff"
                        );
                    }
                    Decision::DeadLetter => {
                        job.mark_dead_lettered(&error, now);
                        warn!(
                            job_id = %job_id,
                            job_type = %job.job_type,
                            attempts = job.attempts,
                            "job dead-lettered: attempts exhausted"
                        );
                    }
                }
            }
        }
        Ok(true)
    }

    async fn reap_stuck_jobs(&self, lease_timeout_minutes: u32) -> Result<u64, QueueError> {
        let lease = lease_duration(lease_timeout_minutes)?;
        let mut table = self.write_jobs().await?;
        let now = self.clock.now();

        let mut reaped = 0;
        for job in table.jobs.values_mut().filter(|job| job.lease_expired(now, lease)) {
            let holder = job.worker_id.clone().unwrap_or_else(|| "-".to_string());
            job.record_reap();
            let reason = format!(
                "lease expired: worker {holder} did not report within {lease_timeout_minutes} minute(s)"
            );
            match self.decider.on_reap(job, self.reap_requeue_delay, now) {
                Decision::Requeue { run_at } => {
                    job.requeue(run_at, Some(reason), now);
                    info!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        worker_id = %holder,
                        attempts = job.attempts,
                        reap_count = job.reap_count,
                        "reaped stuck job"
                    );
                }
                Decision::DeadLetter => {
                    job.mark_dead_lettered(&reason, now);
                    warn!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        worker_id = %holder,
                        attempts = job.attempts,
                        "reaped stuck job into dead letter"
                    );
                }
            }
            reaped += 1;
        }
        Ok(reaped)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<JobRecord>, QueueError> {
        let table = self.read_jobs().await?;
        Ok(table.jobs.get(&job_id).cloned())
    }
}

#[async_trait]
impl HeartbeatRegistry for InMemoryJobStore {
    async fn register_heartbeat(
        &self,
        worker_id: &str,
        worker_type: &str,
        hostname: &str,
        status: &str,
    ) -> Result<(), QueueError> {
        check_worker_id(worker_id)?;
        let wait = self.config.lock_wait();
        let mut beats = tokio::time::timeout(wait, self.heartbeats.write())
            .await
            .map_err(|_| QueueError::StoreBusy(wait))?;
        let now = self.clock.now();

        let beat = beats
            .entry(worker_id.to_string())
            .or_insert_with(|| WorkerHeartbeat {
                worker_id: worker_id.to_string(),
                worker_type: worker_type.to_string(),
                hostname: hostname.to_string(),
                status: status.to_string(),
                last_seen_at: now,
            });
        beat.worker_type = worker_type.to_string();
        beat.hostname = hostname.to_string();
        beat.status = status.to_string();
        beat.last_seen_at = beat.last_seen_at.max(now);
        Ok(())
    }

    async fn heartbeats(&self) -> Result<Vec<WorkerHeartbeat>, QueueError> {
        let wait = self.config.lock_wait();
        let beats = tokio::time::timeout(wait, self.heartbeats.read())
            .await
            .map_err(|_| QueueError::StoreBusy(wait))?;
        Ok(beats.values().cloned().collect())
    }
}

#[async_trait]
impl HealthViews for InMemoryJobStore {
    async fn health(
        &self,
        lease_timeout_minutes: u32,
        thresholds: &LivenessThresholds,
    ) -> Result<HealthReport, QueueError> {
        let lease = lease_duration(lease_timeout_minutes)?;
        let heartbeats = self.heartbeats().await?;
        let table = self.read_jobs().await?;
        Ok(HealthReport::from_rows(
            table.jobs.values(),
            &heartbeats,
            self.clock.now(),
            lease,
            thresholds,
        ))
    }
}
