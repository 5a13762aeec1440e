//! Worker heartbeats and liveness classification.
//!
//! Classification is a presentation concern: `classify` is a pure function
//! over the age of the last beat, so thresholds can change without touching
//! the write path.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Self-reported statuses that count as healthy.
pub const HEALTHY_STATUSES: [&str; 2] = ["running", "idle"];

/// Status a worker reports when it shuts down cleanly.
pub const STOPPED_STATUS: &str = "stopped";

/// Liveness row, one per worker process, upserted by `worker_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHeartbeat {
    pub worker_id: String,
    pub worker_type: String,
    pub hostname: String,
    pub status: String,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Online,
    Stale,
    Offline,
}

/// Age thresholds, in seconds.
///
/// - age <= `online_within_secs` and healthy status: online
/// - age <= `offline_after_secs`: stale
/// - otherwise: offline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessThresholds {
    pub online_within_secs: i64,
    pub offline_after_secs: i64,
}

impl Default for LivenessThresholds {
    fn default() -> Self {
        Self {
            online_within_secs: 60,
            offline_after_secs: 90,
        }
    }
}

impl LivenessThresholds {
    pub fn online_within(&self) -> Duration {
        Duration::seconds(self.online_within_secs)
    }

    pub fn offline_after(&self) -> Duration {
        Duration::seconds(self.offline_after_secs.max(self.online_within_secs))
    }
}

/// Classify a worker from its last beat.
///
/// A fresh beat with an unhealthy status is stale; an explicit `stopped`
/// is offline regardless of age.
pub fn classify(
    last_seen_at: DateTime<Utc>,
    status: &str,
    now: DateTime<Utc>,
    thresholds: &LivenessThresholds,
) -> Liveness {
    if status == STOPPED_STATUS {
        return Liveness::Offline;
    }
    let age = now - last_seen_at;
    if age <= thresholds.online_within() && HEALTHY_STATUSES.contains(&status) {
        Liveness::Online
    } else if age <= thresholds.offline_after() {
        Liveness::Stale
    } else {
        Liveness::Offline
    }
}

impl WorkerHeartbeat {
    pub fn liveness(&self, now: DateTime<Utc>, thresholds: &LivenessThresholds) -> Liveness {
        classify(self.last_seen_at, &self.status, now, thresholds)
    }
}
