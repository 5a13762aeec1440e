//! PostgreSQL job store (`postgres` feature).
//!
//! Same contract as the in-memory store. Mutual exclusion comes from row
//! locks: claims and reaps use `FOR UPDATE SKIP LOCKED`, and every
//! transaction sets `lock_timeout` so a blocked call gives up instead of
//! hanging. Timestamps are the database's `now()`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
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
use crate::ports::{HealthViews, HeartbeatRegistry, IdGenerator, JobStore, SystemClock, UlidGenerator};

const SCHEMA_SQL: &str = include_str!("../../migrations/0001_ops_schema.sql");

const JOB_COLUMNS: &str = "id, job_type, payload, status, priority, run_at, attempts, max_attempts, \
     locked_at, worker_id, last_error, reap_count, seq, created_at, updated_at";

/// SQLSTATE `lock_not_available`, raised when `lock_timeout` fires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

const NO_ERROR_TEXT: &str = "failed without an error message";

fn is_lock_timeout(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(LOCK_NOT_AVAILABLE))
}

fn to_u32(value: i32, column: &str) -> Result<u32, QueueError> {
    u32::try_from(value).map_err(|_| QueueError::Storage(format!("negative {column}: {value}")))
}

fn to_i32(value: u32, what: &str) -> Result<i32, QueueError> {
    i32::try_from(value).map_err(|_| QueueError::InvalidArgument(format!("{what} out of range: {value}")))
}

fn parse_job_id(raw: &str) -> Result<JobId, QueueError> {
    raw.parse()
        .map_err(|e| QueueError::Storage(format!("bad job id {raw:?}: {e}")))
}

fn job_from_row(row: &PgRow) -> Result<JobRecord, QueueError> {
    let id: String = row.try_get("id")?;
    let job_type: String = row.try_get("job_type")?;
    let status: String = row.try_get("status")?;
    let Json(payload): Json<serde_json::Value> = row.try_get("payload")?;
    let seq: i64 = row.try_get("seq")?;

    Ok(JobRecord {
        id: parse_job_id(&id)?,
        job_type: JobType::new(&job_type).map_err(|e| QueueError::Storage(e.to_string()))?,
        payload,
        status: status
            .parse::<JobStatus>()
            .map_err(|e| QueueError::Storage(e.to_string()))?,
        priority: row.try_get("priority")?,
        run_at: row.try_get("run_at")?,
        attempts: to_u32(row.try_get("attempts")?, "attempts")?,
        max_attempts: to_u32(row.try_get("max_attempts")?, "max_attempts")?,
        locked_at: row.try_get("locked_at")?,
        worker_id: row.try_get("worker_id")?,
        last_error: row.try_get("last_error")?,
        reap_count: to_u32(row.try_get("reap_count")?, "reap_count")?,
        seq: u64::try_from(seq).unwrap_or_default(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct PostgresJobStore {
    pool: PgPool,
    ids: Box<dyn IdGenerator>,
    decider: DefaultDecider,
    config: QueueConfig,
    reap_requeue_delay: Duration,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool, config: QueueConfig) -> Self {
        Self {
            pool,
            ids: Box::new(UlidGenerator::new(SystemClock)),
            decider: DefaultDecider::new(config.retry.clone()),
            config,
            reap_requeue_delay: Duration::zero(),
        }
    }

    pub async fn connect(database_url: &str, config: QueueConfig) -> Result<Self, QueueError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool, config))
    }

    pub fn with_reap_requeue_delay(mut self, delay: Duration) -> Self {
        self.reap_requeue_delay = delay.max(Duration::zero());
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `ops` schema, tables and views if missing.
    pub async fn migrate(&self) -> Result<(), QueueError> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        // SET cannot take bind parameters; the value is an integer we format.
        let set_timeout = format!("SET LOCAL lock_timeout = '{}ms'", self.config.lock_wait_ms);
        sqlx::query(&set_timeout).execute(&mut *tx).await?;
        Ok(tx)
    }

    fn store_err(&self, err: sqlx::Error) -> QueueError {
        if is_lock_timeout(&err) {
            QueueError::StoreBusy(self.config.lock_wait())
        } else {
            err.into()
        }
    }

    async fn db_now(tx: &mut Transaction<'static, Postgres>) -> Result<DateTime<Utc>, sqlx::Error> {
        sqlx::query_scalar("SELECT now()").fetch_one(&mut **tx).await
    }

    /// Persist the mutable columns of a record changed in Rust.
    async fn write_back(
        tx: &mut Transaction<'static, Postgres>,
        job: &JobRecord,
    ) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            UPDATE ops.jobs
            SET status = $2,
                run_at = $3,
                attempts = $4,
                locked_at = $5,
                worker_id = $6,
                last_error = $7,
                reap_count = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(job.id.as_ulid().to_string())
        .bind(job.status.as_str())
        .bind(job.run_at)
        .bind(to_i32(job.attempts, "attempts")?)
        .bind(job.locked_at)
        .bind(job.worker_id.as_deref())
        .bind(job.last_error.as_deref())
        .bind(to_i32(job.reap_count, "reap_count")?)
        .bind(job.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn try_claim(
        &self,
        job_types: &[String],
        lease_minutes: i32,
        worker_id: &str,
    ) -> Result<Option<PgRow>, sqlx::Error> {
        let mut tx = self.begin().await?;
        let row = sqlx::query(
            r#"
            WITH candidate AS (
                SELECT id
                FROM ops.jobs
                WHERE job_type = ANY($1)
                  AND (
                        (status = 'pending' AND run_at <= now())
                     OR (status = 'processing'
                         AND locked_at < now() - make_interval(mins => $2)
                         AND attempts < max_attempts)
                  )
                ORDER BY created_at ASC, priority DESC, seq ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE ops.jobs AS j
            SET status = 'processing',
                locked_at = now(),
                worker_id = $3,
                attempts = j.attempts + 1,
                updated_at = now()
            FROM candidate
            WHERE j.id = candidate.id
            RETURNING j.id, j.job_type, j.payload, j.attempts, j.created_at
            "#,
        )
        .bind(job_types)
        .bind(lease_minutes)
        .bind(worker_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row)
    }
}

fn claimed_from_row(row: &PgRow) -> Result<ClaimedJob, QueueError> {
    let id: String = row.try_get("id")?;
    let job_type: String = row.try_get("job_type")?;
    let Json(payload): Json<serde_json::Value> = row.try_get("payload")?;
    Ok(ClaimedJob {
        id: parse_job_id(&id)?,
        job_type: JobType::new(&job_type).map_err(|e| QueueError::Storage(e.to_string()))?,
        payload,
        attempts: to_u32(row.try_get("attempts")?, "attempts")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn queue_job(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        priority: i32,
        run_at: Option<DateTime<Utc>>,
    ) -> Result<JobId, QueueError> {
        let job_type = JobType::new(job_type)?;
        check_payload(&payload)?;
        let max_attempts = to_i32(self.config.max_attempts_for(job_type.as_str()), "max_attempts")?;
        let id = self.ids.generate_job_id();

        sqlx::query(
            r#"
            INSERT INTO ops.jobs (id, job_type, payload, priority, run_at, max_attempts)
            VALUES ($1, $2, $3, $4, COALESCE($5, now()), $6)
            "#,
        )
        .bind(id.as_ulid().to_string())
        .bind(job_type.as_str())
        .bind(Json(&payload))
        .bind(priority)
        .bind(run_at)
        .bind(max_attempts)
        .execute(&self.pool)
        .await
        .map_err(|e| self.store_err(e))?;

        debug!(job_id = %id, job_type = %job_type, priority, "queued job");
        Ok(id)
    }

    async fn claim_pending_job(
        &self,
        job_types: &[&str],
        lease_timeout_minutes: u32,
        worker_id: &str,
    ) -> Result<Option<ClaimedJob>, QueueError> {
        let job_types: Vec<String> = check_job_types(job_types)?
            .into_iter()
            .map(String::from)
            .collect();
        check_worker_id(worker_id)?;
        lease_duration(lease_timeout_minutes)?;
        let lease_minutes = to_i32(lease_timeout_minutes, "lease_timeout_minutes")?;

        let row = match self.try_claim(&job_types, lease_minutes, worker_id).await {
            Ok(row) => row,
            Err(err) if is_lock_timeout(&err) => {
                debug!(worker_id, "claim gave up waiting for a row lock");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let Some(row) = row else {
            return Ok(None);
        };
        let claimed = claimed_from_row(&row)?;
        debug!(job_id = %claimed.id, job_type = %claimed.job_type, worker_id, attempts = claimed.attempts, "claimed job");
        Ok(Some(claimed))
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

        let mut tx = self.begin().await.map_err(|e| self.store_err(e))?;
        let select = format!("SELECT {JOB_COLUMNS} FROM ops.jobs WHERE id = $1 AND status = 'processing' FOR UPDATE");
        let row = sqlx::query(&select)
            .bind(job_id.as_ulid().to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| self.store_err(e))?;
        let Some(row) = row else {
            debug!(job_id = %job_id, %status, "status update ignored: job is not processing");
            return Ok(false);
        };
        let mut job = job_from_row(&row)?;
        let now = Self::db_now(&mut tx).await?;

        match status {
            JobStatus::Completed => {
                job.mark_completed(now);
                debug!(job_id = %job_id, job_type = %job.job_type, attempts = job.attempts, "job completed");
            }
            _ => {
                let error = error.unwrap_or_else(|| NO_ERROR_TEXT.to_string());
                let backoff = backoff_seconds.map(|secs| Duration::seconds(i64::from(secs)));
                match self.decider.on_failure(&job, backoff, now) {
                    Decision::Requeue { run_at } => {
                        job.requeue(run_at, Some(error), now);
                        info!(job_id = %job_id, job_type = %job.job_type, attempts = job.attempts, run_at = %run_at, "job failed; requeued with backoff");
                    }
                    Decision::DeadLetter => {
                        job.mark_dead_lettered(&error, now);
                        warn!(job_id = %job_id, job_type = %job.job_type, attempts = job.attempts, "job dead-lettered: attempts exhausted");
                    }
                }
            }
        }
        Self::write_back(&mut tx, &job).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn reap_stuck_jobs(&self, lease_timeout_minutes: u32) -> Result<u64, QueueError> {
        lease_duration(lease_timeout_minutes)?;
        let lease_minutes = to_i32(lease_timeout_minutes, "lease_timeout_minutes")?;

        let mut tx = self.begin().await.map_err(|e| self.store_err(e))?;
        let select = format!(
            "SELECT {JOB_COLUMNS} FROM ops.jobs \
             WHERE status = 'processing' AND locked_at < now() - make_interval(mins => $1) \
             FOR UPDATE SKIP LOCKED"
        );
        let rows = sqlx::query(&select)
            .bind(lease_minutes)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| self.store_err(e))?;
        let now = Self::db_now(&mut tx).await?;

        let mut reaped = 0;
        for row in &rows {
            let mut job = job_from_row(row)?;
            let holder = job.worker_id.clone().unwrap_or_else(|| "-".to_string());
            job.record_reap();
            let reason = format!(
                "lease expired: worker {holder} did not report within {lease_timeout_minutes} minute(s)"
            );
            match self.decider.on_reap(&job, self.reap_requeue_delay, now) {
                Decision::Requeue { run_at } => {
                    job.requeue(run_at, Some(reason), now);
                    info!(job_id = %job.id, job_type = %job.job_type, worker_id = %holder, attempts = job.attempts, "reaped stuck job");
                }
                Decision::DeadLetter => {
                    job.mark_dead_lettered(&reason, now);
                    warn!(job_id = %job.id, job_type = %job.job_type, worker_id = %holder, attempts = job.attempts, "reaped stuck job into dead letter");
                }
            }
            Self::write_back(&mut tx, &job).await?;
            reaped += 1;
        }
        tx.commit().await?;
        Ok(reaped)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<JobRecord>, QueueError> {
        let select = format!("SELECT {JOB_COLUMNS} FROM ops.jobs WHERE id = $1");
        let row = sqlx::query(&select)
            .bind(job_id.as_ulid().to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }
}

#[async_trait]
impl HeartbeatRegistry for PostgresJobStore {
    async fn register_heartbeat(
        &self,
        worker_id: &str,
        worker_type: &str,
        hostname: &str,
        status: &str,
    ) -> Result<(), QueueError> {
        check_worker_id(worker_id)?;
        sqlx::query(
            r#"
            INSERT INTO ops.worker_heartbeats (worker_id, worker_type, hostname, status, last_seen_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (worker_id) DO UPDATE
            SET worker_type = EXCLUDED.worker_type,
                hostname = EXCLUDED.hostname,
                status = EXCLUDED.status,
                last_seen_at = GREATEST(ops.worker_heartbeats.last_seen_at, EXCLUDED.last_seen_at)
            "#,
        )
        .bind(worker_id)
        .bind(worker_type)
        .bind(hostname)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn heartbeats(&self) -> Result<Vec<WorkerHeartbeat>, QueueError> {
        let rows = sqlx::query(
            "SELECT worker_id, worker_type, hostname, status, last_seen_at FROM ops.worker_heartbeats",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> Result<WorkerHeartbeat, QueueError> {
                Ok(WorkerHeartbeat {
                    worker_id: row.try_get("worker_id")?,
                    worker_type: row.try_get("worker_type")?,
                    hostname: row.try_get("hostname")?,
                    status: row.try_get("status")?,
                    last_seen_at: row.try_get("last_seen_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl HealthViews for PostgresJobStore {
    async fn health(
        &self,
        lease_timeout_minutes: u32,
        thresholds: &LivenessThresholds,
    ) -> Result<HealthReport, QueueError> {
        let lease = lease_duration(lease_timeout_minutes)?;
        let now: DateTime<Utc> = sqlx::query_scalar("SELECT now()").fetch_one(&self.pool).await?;

        // Completed rows only contribute a count.
        let select = format!("SELECT {JOB_COLUMNS} FROM ops.jobs WHERE status <> 'completed'");
        let rows = sqlx::query(&select).fetch_all(&self.pool).await?;
        let jobs = rows.iter().map(job_from_row).collect::<Result<Vec<_>, _>>()?;
        let completed: Vec<(String, i64)> = sqlx::query_as(
            "SELECT job_type, count(*) FROM ops.jobs WHERE status = 'completed' GROUP BY job_type",
        )
        .fetch_all(&self.pool)
        .await?;

        let heartbeats = self.heartbeats().await?;
        let mut report = HealthReport::from_rows(&jobs, &heartbeats, now, lease, thresholds);
        for (job_type, count) in completed {
            report.depth_by_type.entry(job_type).or_default().completed =
                usize::try_from(count).unwrap_or_default();
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(config: QueueConfig) -> PostgresJobStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let store = PostgresJobStore::connect(&url, config).await.expect("connect");
        store.migrate().await.expect("migrate");
        store
    }

    /// A job type no other test run uses.
    fn unique_type() -> String {
        format!("pgtest-{}", ulid::Ulid::new()).to_lowercase()
    }

    #[tokio::test]
    #[ignore] // requires DATABASE_URL
    async fn claim_complete_cycle() {
        let store = store(QueueConfig::default()).await;
        let job_type = unique_type();
        let id = store
            .queue_job(&job_type, serde_json::json!({"n": 1}), 0, None)
            .await
            .unwrap();

        let claimed = store.claim_pending_job(&[job_type.as_str()], 5, "w1").await.unwrap().unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.attempts, 1);
        assert!(store.claim_pending_job(&[job_type.as_str()], 5, "w2").await.unwrap().is_none());

        assert!(store.update_job_status(id, JobStatus::Completed, None, None).await.unwrap());
        assert!(!store.update_job_status(id, JobStatus::Completed, None, None).await.unwrap());
        assert_eq!(store.get_job(id).await.unwrap().unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    #[ignore] // requires DATABASE_URL
    async fn failure_with_one_attempt_dead_letters() {
        let mut config = QueueConfig::default();
        config.default_max_attempts = 1;
        let store = store(config).await;
        let job_type = unique_type();
        let id = store.queue_job(&job_type, serde_json::json!({}), 0, None).await.unwrap();
        store.claim_pending_job(&[job_type.as_str()], 5, "w1").await.unwrap().unwrap();

        store.update_job_status(id, JobStatus::Failed, Some("boom"), None).await.unwrap();

        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.is_dead_lettered());
        assert!(store.claim_pending_job(&[job_type.as_str()], 5, "w1").await.unwrap().is_none());
    }

    /// Push a lease into the past instead of waiting it out.
    async fn age_lease(store: &PostgresJobStore, id: JobId, minutes: i32) {
        sqlx::query("UPDATE ops.jobs SET locked_at = now() - make_interval(mins => $2) WHERE id = $1")
            .bind(id.as_ulid().to_string())
            .bind(minutes)
            .execute(store.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore] // requires DATABASE_URL
    async fn failure_requeues_with_policy_or_explicit_backoff() {
        let store = store(QueueConfig::default()).await;
        let job_type = unique_type();
        let id = store.queue_job(&job_type, serde_json::json!({}), 0, None).await.unwrap();

        store.claim_pending_job(&[job_type.as_str()], 5, "w1").await.unwrap().unwrap();
        assert!(store.update_job_status(id, JobStatus::Failed, Some("upstream 503"), None).await.unwrap());
        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.locked_at, None);
        assert_eq!(job.last_error.as_deref(), Some("upstream 503"));
        assert_eq!(job.run_at - job.updated_at, store.decider.retry_policy().next_delay(1));
        assert!(store.claim_pending_job(&[job_type.as_str()], 5, "w1").await.unwrap().is_none());

        sqlx::query("UPDATE ops.jobs SET run_at = now() WHERE id = $1")
            .bind(id.as_ulid().to_string())
            .execute(store.pool())
            .await
            .unwrap();
        store.claim_pending_job(&[job_type.as_str()], 5, "w1").await.unwrap().unwrap();
        store.update_job_status(id, JobStatus::Failed, Some("rate limited"), Some(7)).await.unwrap();
        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.attempts, 2);
        assert_eq!(job.run_at - job.updated_at, Duration::seconds(7));
    }

    #[tokio::test]
    #[ignore] // requires DATABASE_URL
    async fn reaper_requeues_then_dead_letters() {
        let mut config = QueueConfig::default();
        config.default_max_attempts = 2;
        let store = store(config).await;
        let job_type = unique_type();
        let id = store.queue_job(&job_type, serde_json::json!({}), 0, None).await.unwrap();

        store.claim_pending_job(&[job_type.as_str()], 5, "w1").await.unwrap().unwrap();
        assert_eq!(store.reap_stuck_jobs(5).await.unwrap(), 0);
        age_lease(&store, id, 10).await;
        assert!(store.reap_stuck_jobs(5).await.unwrap() >= 1);

        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.reap_count, 1);
        assert_eq!(job.locked_at, None);
        assert!(job.last_error.unwrap().contains("w1"));

        let claimed = store.claim_pending_job(&[job_type.as_str()], 5, "w2").await.unwrap().unwrap();
        assert_eq!(claimed.attempts, 2);
        age_lease(&store, id, 10).await;
        store.reap_stuck_jobs(5).await.unwrap();

        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.reap_count, 2);
        assert!(job.is_dead_lettered());
        assert!(!store.update_job_status(id, JobStatus::Completed, None, None).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // requires DATABASE_URL
    async fn heartbeat_upsert_never_moves_last_seen_backwards() {
        let store = store(QueueConfig::default()).await;
        let worker_id = format!("pgtest-worker-{}", ulid::Ulid::new());

        store.register_heartbeat(&worker_id, "ingestion", "host-a", "running").await.unwrap();
        sqlx::query("UPDATE ops.worker_heartbeats SET last_seen_at = now() + interval '1 hour' WHERE worker_id = $1")
            .bind(&worker_id)
            .execute(store.pool())
            .await
            .unwrap();
        let ahead = store.heartbeats().await.unwrap().into_iter().find(|b| b.worker_id == worker_id).unwrap();

        store.register_heartbeat(&worker_id, "enrichment", "host-b", "idle").await.unwrap();
        let beat = store.heartbeats().await.unwrap().into_iter().find(|b| b.worker_id == worker_id).unwrap();
        assert_eq!(beat.last_seen_at, ahead.last_seen_at);
        assert_eq!(beat.status, "idle");
        assert_eq!(beat.worker_type, "enrichment");
        assert_eq!(beat.hostname, "host-b");
    }

    #[tokio::test]
    #[ignore] // requires DATABASE_URL
    async fn health_counts_completed_alongside_open_rows() {
        let store = store(QueueConfig::default()).await;
        let job_type = unique_type();
        for _ in 0..3 {
            store.queue_job(&job_type, serde_json::json!({}), 0, None).await.unwrap();
        }
        for _ in 0..2 {
            let job = store.claim_pending_job(&[job_type.as_str()], 5, "w1").await.unwrap().unwrap();
            store.update_job_status(job.id, JobStatus::Completed, None, None).await.unwrap();
        }

        let report = store.health(5, &LivenessThresholds::default()).await.unwrap();
        let depth = &report.depth_by_type[job_type.as_str()];
        assert_eq!(depth.completed, 2);
        assert_eq!(depth.pending, 1);
        assert_eq!(depth.processing, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore] // requires DATABASE_URL
    async fn concurrent_claims_are_exclusive() {
        let store = std::sync::Arc::new(store(QueueConfig::default()).await);
        let job_type = unique_type();
        for _ in 0..20 {
            store.queue_job(&job_type, serde_json::json!({}), 0, None).await.unwrap();
        }

        let mut handles = Vec::new();
        for w in 0..8 {
            let store = store.clone();
            let job_type = job_type.clone();
            handles.push(tokio::spawn(async move {
                let worker = format!("w{w}");
                let mut ids = Vec::new();
                while let Some(job) = store.claim_pending_job(&[job_type.as_str()], 5, &worker).await.unwrap() {
                    ids.push(job.id);
                }
                ids
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 20);
    }
}
