//! Health views and tracing setup.
//!
//! `HealthReport` is what dashboards and alerts read: queue depth per type,
//! oldest waiting job, stuck leases, dead-letter growth, worker liveness.
//! It is derived on demand and never written back.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::domain::{JobRecord, JobStatus, Liveness, LivenessThresholds, WorkerHeartbeat};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDepth {
    pub pending: usize,
    /// Pending rows whose `run_at` has passed.
    pub eligible: usize,
    pub processing: usize,
    pub completed: usize,
    pub dead_lettered: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerLiveness {
    pub worker_id: String,
    pub worker_type: String,
    pub hostname: String,
    pub status: String,
    pub last_seen_at: DateTime<Utc>,
    pub age_secs: i64,
    pub liveness: Liveness,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessCounts {
    pub online: usize,
    pub stale: usize,
    pub offline: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub depth_by_type: BTreeMap<String, TypeDepth>,
    /// Seconds the longest-waiting eligible job has been claimable.
    pub oldest_pending_age_secs: Option<i64>,
    /// Processing rows whose lease has expired.
    pub stuck_processing: usize,
    pub dead_lettered_last_hour: usize,
    pub dead_lettered_last_24h: usize,
    pub workers: Vec<WorkerLiveness>,
    pub liveness: LivenessCounts,
}

impl HealthReport {
    /// Compute the report from row copies.
    pub fn from_rows<'a>(
        jobs: impl IntoIterator<Item = &'a JobRecord>,
        heartbeats: &[WorkerHeartbeat],
        now: DateTime<Utc>,
        lease: Duration,
        thresholds: &LivenessThresholds,
    ) -> Self {
        let mut depth_by_type: BTreeMap<String, TypeDepth> = BTreeMap::new();
        let mut oldest_pending_age_secs: Option<i64> = None;
        let mut stuck_processing = 0;
        let mut dead_lettered_last_hour = 0;
        let mut dead_lettered_last_24h = 0;

        for job in jobs {
            let depth = depth_by_type.entry(job.job_type.to_string()).or_default();
            match job.status {
                JobStatus::Pending => {
                    depth.pending += 1;
                    if job.run_at <= now {
                        depth.eligible += 1;
                        let age = (now - job.run_at).num_seconds();
                        oldest_pending_age_secs = Some(oldest_pending_age_secs.map_or(age, |a| a.max(age)));
                    }
                }
                JobStatus::Processing => {
                    depth.processing += 1;
                    if job.lease_expired(now, lease) {
                        stuck_processing += 1;
                    }
                }
                JobStatus::Completed => depth.completed += 1,
                JobStatus::Failed => {
                    depth.dead_lettered += 1;
                    let age = now - job.updated_at;
                    if age <= Duration::hours(1) {
                        dead_lettered_last_hour += 1;
                    }
                    if age <= Duration::hours(24) {
                        dead_lettered_last_24h += 1;
                    }
                }
            }
        }

        let mut liveness = LivenessCounts::default();
        let mut workers: Vec<WorkerLiveness> = heartbeats
            .iter()
            .map(|hb| {
                let class = hb.liveness(now, thresholds);
                match class {
                    Liveness::Online => liveness.online += 1,
                    Liveness::Stale => liveness.stale += 1,
                    Liveness::Offline => liveness.offline += 1,
                }
                WorkerLiveness {
                    worker_id: hb.worker_id.clone(),
                    worker_type: hb.worker_type.clone(),
                    hostname: hb.hostname.clone(),
                    status: hb.status.clone(),
                    last_seen_at: hb.last_seen_at,
                    age_secs: (now - hb.last_seen_at).num_seconds(),
                    liveness: class,
                }
            })
            .collect();
        workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));

        Self {
            generated_at: now,
            depth_by_type,
            oldest_pending_age_secs,
            stuck_processing,
            dead_lettered_last_hour,
            dead_lettered_last_24h,
            workers,
            liveness,
        }
    }

    /// Total pending rows across all types.
    pub fn total_pending(&self) -> usize {
        self.depth_by_type.values().map(|d| d.pending).sum()
    }
}

/// Initialize tracing for the process: JSON lines, filter from `RUST_LOG`
/// (default `info`).
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobId, JobType};
    use chrono::TimeZone;
    use ulid::Ulid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn job(job_type: &str, status: JobStatus) -> JobRecord {
        let mut job = JobRecord::new(
            JobId::from_ulid(Ulid::new()),
            JobType::new(job_type).unwrap(),
            serde_json::json!({}),
            0,
            now(),
            3,
            1,
            now(),
        );
        job.status = status;
        job
    }

    #[test]
    fn counts_depth_per_type_and_status() {
        let mut delayed = job("ingestion", JobStatus::Pending);
        delayed.run_at = now() + Duration::minutes(5);
        let mut waiting = job("ingestion", JobStatus::Pending);
        waiting.run_at = now() - Duration::seconds(90);
        let jobs = vec![
            delayed,
            waiting,
            job("ingestion", JobStatus::Completed),
            job("enrichment", JobStatus::Failed),
        ];

        let report = HealthReport::from_rows(
            &jobs,
            &[],
            now(),
            Duration::minutes(5),
            &LivenessThresholds::default(),
        );

        let ingestion = &report.depth_by_type["ingestion"];
        assert_eq!(ingestion.pending, 2);
        assert_eq!(ingestion.eligible, 1);
        assert_eq!(ingestion.completed, 1);
        assert_eq!(report.depth_by_type["enrichment"].dead_lettered, 1);
        assert_eq!(report.oldest_pending_age_secs, Some(90));
        assert_eq!(report.total_pending(), 2);
    }

    #[test]
    fn stuck_and_dead_letter_windows() {
        let mut stuck = job("ingestion", JobStatus::Processing);
        stuck.locked_at = Some(now() - Duration::minutes(10));
        let mut fresh = job("ingestion", JobStatus::Processing);
        fresh.locked_at = Some(now() - Duration::minutes(1));
        let mut dead_recent = job("ingestion", JobStatus::Failed);
        dead_recent.updated_at = now() - Duration::minutes(30);
        let mut dead_old = job("ingestion", JobStatus::Failed);
        dead_old.updated_at = now() - Duration::hours(5);
        let mut dead_ancient = job("ingestion", JobStatus::Failed);
        dead_ancient.updated_at = now() - Duration::days(3);

        let jobs = [stuck, fresh, dead_recent, dead_old, dead_ancient];
        let report = HealthReport::from_rows(
            &jobs,
            &[],
            now(),
            Duration::minutes(5),
            &LivenessThresholds::default(),
        );

        assert_eq!(report.stuck_processing, 1);
        assert_eq!(report.dead_lettered_last_hour, 1);
        assert_eq!(report.dead_lettered_last_24h, 2);
        assert_eq!(report.oldest_pending_age_secs, None);
    }

    #[test]
    fn workers_are_classified_and_counted() {
        let beat = |id: &str, age: i64, status: &str| WorkerHeartbeat {
            worker_id: id.to_string(),
            worker_type: "ingestion".to_string(),
            hostname: "host-a".to_string(),
            status: status.to_string(),
            last_seen_at: now() - Duration::seconds(age),
        };
        let beats = [
            beat("w3", 500, "running"),
            beat("w1", 5, "running"),
            beat("w2", 75, "running"),
        ];

        let report = HealthReport::from_rows(
            std::iter::empty(),
            &beats,
            now(),
            Duration::minutes(5),
            &LivenessThresholds::default(),
        );

        assert_eq!(report.liveness, LivenessCounts { online: 1, stale: 1, offline: 1 });
        let ids: Vec<_> = report.workers.iter().map(|w| w.worker_id.as_str()).collect();
        assert_eq!(ids, ["w1", "w2", "w3"]);
        assert_eq!(report.workers[0].liveness, Liveness::Online);
        assert_eq!(report.workers[2].age_secs, 500);
    }
}
