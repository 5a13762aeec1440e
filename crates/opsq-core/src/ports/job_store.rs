//! JobStore port - 正本（source of truth）への唯一の入口
//!
//! ジョブ行を変更できるのはこの trait の 4 操作だけ。
//! 各操作は 1 つのアトミックな遷移として実装される。
//! 読み取り専用のヘルスビューは `HealthViews`、ワーカーの生存通知は
//! `HeartbeatRegistry` に分かれている。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::domain::{ClaimedJob, JobId, JobRecord, JobStatus, JobType, LivenessThresholds, WorkerHeartbeat};
use crate::error::QueueError;
use crate::observability::HealthReport;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a pending job. `run_at` defaults to now; a past `run_at` is
    /// accepted and simply means "eligible immediately".
    async fn queue_job(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        priority: i32,
        run_at: Option<DateTime<Utc>>,
    ) -> Result<JobId, QueueError>;

    /// Atomically lease the next eligible job of one of `job_types`.
    ///
    /// Returns `Ok(None)` when nothing is eligible or when contention kept
    /// the store from answering within its lock-wait bound.
    async fn claim_pending_job(
        &self,
        job_types: &[&str],
        lease_timeout_minutes: u32,
        worker_id: &str,
    ) -> Result<Option<ClaimedJob>, QueueError>;

    /// Report the outcome of a leased job (`completed` or `failed`).
    ///
    /// Returns whether a row was updated; `false` means the job is unknown
    /// or no longer `processing` (already reported, or reaped).
    async fn update_job_status(
        &self,
        job_id: JobId,
        status: JobStatus,
        error: Option<&str>,
        backoff_seconds: Option<u32>,
    ) -> Result<bool, QueueError>;

    /// Recover every `processing` job whose lease is older than the
    /// timeout. Returns how many rows were recovered.
    async fn reap_stuck_jobs(&self, lease_timeout_minutes: u32) -> Result<u64, QueueError>;

    /// Read-only copy of one row.
    async fn get_job(&self, job_id: JobId) -> Result<Option<JobRecord>, QueueError>;
}

#[async_trait]
pub trait HeartbeatRegistry: Send + Sync {
    /// Upsert by `worker_id`, refreshing `last_seen_at`.
    async fn register_heartbeat(
        &self,
        worker_id: &str,
        worker_type: &str,
        hostname: &str,
        status: &str,
    ) -> Result<(), QueueError>;

    async fn heartbeats(&self) -> Result<Vec<WorkerHeartbeat>, QueueError>;
}

#[async_trait]
pub trait HealthViews: Send + Sync {
    /// Aggregates for dashboards; mutates nothing.
    async fn health(
        &self,
        lease_timeout_minutes: u32,
        thresholds: &LivenessThresholds,
    ) -> Result<HealthReport, QueueError>;
}

/// Everything a worker process needs from the store.
pub trait OpsStore: JobStore + HeartbeatRegistry + HealthViews {}

impl<T: JobStore + HeartbeatRegistry + HealthViews> OpsStore for T {}

// ---------------------------------------------------------------------------
// Argument checks shared by every store implementation.
// ---------------------------------------------------------------------------

pub(crate) fn check_payload(payload: &serde_json::Value) -> Result<(), QueueError> {
    if payload.is_object() {
        Ok(())
    } else {
        Err(QueueError::InvalidPayload(format!(
            "expected a JSON object, got {}",
            json_kind(payload)
        )))
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

pub(crate) fn check_job_types(job_types: &[&str]) -> Result<Vec<JobType>, QueueError> {
    if job_types.is_empty() {
        return Err(QueueError::InvalidArgument(
            "claim needs at least one job_type".to_string(),
        ));
    }
    job_types.iter().map(JobType::new).collect()
}

pub(crate) fn check_worker_id(worker_id: &str) -> Result<(), QueueError> {
    if worker_id.trim().is_empty() {
        return Err(QueueError::InvalidArgument("worker_id must not be empty".to_string()));
    }
    Ok(())
}

pub(crate) fn lease_duration(lease_timeout_minutes: u32) -> Result<Duration, QueueError> {
    if lease_timeout_minutes == 0 {
        return Err(QueueError::InvalidArgument(
            "lease_timeout_minutes must be at least 1".to_string(),
        ));
    }
    Ok(Duration::minutes(i64::from(lease_timeout_minutes)))
}

pub(crate) fn check_reportable(status: JobStatus) -> Result<(), QueueError> {
    if status.is_reportable() {
        Ok(())
    } else {
        Err(QueueError::InvalidStatusTransition(status))
    }
}
