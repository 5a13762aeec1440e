//! Configuration for the store, workers, reaper and health views.
//!
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```json
//! { "queue": { "default_max_attempts": 3 }, "reaper": { "interval_secs": 30 } }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::job::DEFAULT_MAX_ERROR_LEN;
use crate::domain::{LivenessThresholds, RetryPolicy};
use crate::error::QueueError;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub reaper: ReaperConfig,
    pub liveness: LivenessThresholds,
}

impl OpsConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, QueueError> {
        serde_json::from_str(raw).map_err(|e| QueueError::InvalidArgument(format!("config: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| QueueError::InvalidArgument(format!("config {}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }
}

/// Store behaviour: retry ceilings, backoff, lock discipline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Attempt ceiling for job types without an override.
    pub default_max_attempts: u32,
    /// Per-type attempt ceilings, keyed by job_type.
    pub max_attempts_by_type: HashMap<String, u32>,
    pub retry: RetryPolicy,
    /// Upper bound on waiting for the store lock.
    pub lock_wait_ms: u64,
    /// Candidates fetched per claim round.
    pub claim_batch_size: usize,
    /// Claim rounds before giving up under contention.
    pub claim_rounds: usize,
    /// Stored error text is cut to this many characters.
    pub max_error_len: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 5,
            max_attempts_by_type: HashMap::new(),
            retry: RetryPolicy::default(),
            lock_wait_ms: 2_000,
            claim_batch_size: 16,
            claim_rounds: 3,
            max_error_len: DEFAULT_MAX_ERROR_LEN,
        }
    }
}

impl QueueConfig {
    pub fn max_attempts_for(&self, job_type: &str) -> u32 {
        self.max_attempts_by_type
            .get(job_type)
            .copied()
            .unwrap_or(self.default_max_attempts)
            .max(1)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
}

/// Worker process settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Reported in heartbeats, e.g. `ingestion`.
    pub worker_type: String,
    /// Prefix for generated worker ids (`{prefix}-{n}`).
    pub worker_id_prefix: String,
    pub hostname: String,
    pub concurrency: usize,
    pub lease_timeout_minutes: u32,
    /// Sleep between claims when the queue is empty.
    pub poll_interval_ms: u64,
    pub heartbeat_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_type: "general".to_string(),
            worker_id_prefix: "worker".to_string(),
            hostname: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            concurrency: 2,
            lease_timeout_minutes: 5,
            poll_interval_ms: 500,
            heartbeat_interval_secs: 30,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

/// Reaper settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    pub interval_secs: u64,
    pub lease_timeout_minutes: u32,
    /// Delay before a reaped job is claimable again.
    pub requeue_delay_secs: u32,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            lease_timeout_minutes: 5,
            requeue_delay_secs: 0,
        }
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn requeue_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.requeue_delay_secs))
    }
}
