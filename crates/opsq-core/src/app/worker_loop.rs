//! WorkerLoop - ジョブ実行ループ
//!
//! # フロー
//! 1. `claim_pending_job()` で登録済み job_type のジョブを 1 件 lease
//! 2. Handler を別タスクで実行（panic は失敗として扱う）
//! 3. `update_job_status()` で completed / failed を報告
//! 4. ジョブが無ければ `poll_interval` 待って再試行

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::sleep_or_shutdown;
use crate::config::WorkerConfig;
use crate::domain::{ClaimedJob, JobId, JobStatus};
use crate::error::QueueError;
use crate::ports::OpsStore;
use crate::typed::{HandlerError, JobContext, TypedRegistry};

/// Why a claim/execute/report cycle stopped short.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("claim failed: {0}")]
    Claim(#[source] QueueError),

    /// The handler ran but its outcome was not recorded. The lease stays
    /// until it expires and the job is recovered.
    #[error("status report for {job_id} failed: {source}")]
    Report {
        job_id: JobId,
        #[source]
        source: QueueError,
    },
}

pub struct WorkerLoop {
    worker_id: String,
    store: Arc<dyn OpsStore>,
    registry: Arc<TypedRegistry>,
    job_types: Vec<String>,
    lease_timeout_minutes: u32,
    poll_interval: Duration,
}

impl WorkerLoop {
    pub fn new(
        worker_id: impl Into<String>,
        store: Arc<dyn OpsStore>,
        registry: Arc<TypedRegistry>,
        config: &WorkerConfig,
    ) -> Self {
        let job_types = registry.job_types();
        Self {
            worker_id: worker_id.into(),
            store,
            registry,
            job_types,
            lease_timeout_minutes: config.lease_timeout_minutes,
            poll_interval: config.poll_interval(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// One claim/execute/report cycle. `Ok(false)` means nothing was claimable.
    pub async fn run_once(&self) -> Result<bool, CycleError> {
        let job_types: Vec<&str> = self.job_types.iter().map(String::as_str).collect();
        let Some(job) = self
            .store
            .claim_pending_job(&job_types, self.lease_timeout_minutes, &self.worker_id)
            .await
            .map_err(CycleError::Claim)?
        else {
            return Ok(false);
        };

        let report = match self.execute(&job).await {
            Ok(()) => {
                self.store
                    .update_job_status(job.id, JobStatus::Completed, None, None)
                    .await
            }
            Err(err) => {
                warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    worker_id = %self.worker_id,
                    attempts = job.attempts,
                    error = %err,
                    "handler failed"
                );
                self.store
                    .update_job_status(
                        job.id,
                        JobStatus::Failed,
                        Some(&err.to_string()),
                        err.backoff_secs(),
                    )
                    .await
            }
        };
        let updated = report.map_err(|source| CycleError::Report { job_id: job.id, source })?;
        if !updated {
            warn!(
                job_id = %job.id,
                worker_id = %self.worker_id,
                "status report matched no processing row; lease was lost"
            );
        }
        Ok(true)
    }

    async fn execute(&self, job: &ClaimedJob) -> Result<(), HandlerError> {
        let Some(handler) = self.registry.get(job.job_type.as_str()) else {
            return Err(HandlerError::failed(format!(
                "no handler registered for job type {}",
                job.job_type
            )));
        };
        let ctx = JobContext::from_claim(job, &self.worker_id);
        let payload = job.payload.clone();

        debug!(job_id = %job.id, worker_id = %self.worker_id, "running handler");
        let task = tokio::spawn(async move { handler.handle_dyn(payload, &ctx).await });
        match task.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                error!(job_id = %job.id, worker_id = %self.worker_id, panic = %message, "handler panicked");
                Err(HandlerError::failed(format!("handler panicked: {message}")))
            }
            Err(join_err) => Err(HandlerError::failed(format!("handler task aborted: {join_err}"))),
        }
    }

    /// Poll until shutdown. In-flight jobs finish before the loop exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = %self.worker_id, job_types = ?self.job_types, "worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let idle = match self.run_once().await {
                Ok(processed) => !processed,
                Err(CycleError::Claim(err)) => {
                    warn!(worker_id = %self.worker_id, error = %err, "claim failed");
                    true
                }
                Err(CycleError::Report { job_id, source }) => {
                    error!(
                        job_id = %job_id,
                        worker_id = %self.worker_id,
                        error = %source,
                        "status report failed; job stays leased until the reaper recovers it"
                    );
                    false
                }
            };
            if idle && sleep_or_shutdown(&mut shutdown, self.poll_interval).await {
                break;
            }
        }
        info!(worker_id = %self.worker_id, "worker stopped");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
