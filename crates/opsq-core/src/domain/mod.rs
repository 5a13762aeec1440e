//! Domain model: job rows, statuses, retry policy, heartbeats.

pub mod decision;
pub mod heartbeat;
pub mod ids;
pub mod job;
pub mod job_type;
pub mod retry;
pub mod state;

pub use self::decision::{Decision, DefaultDecider};
pub use self::heartbeat::{Liveness, LivenessThresholds, WorkerHeartbeat, classify};
pub use self::ids::JobId;
pub use self::job::{ClaimedJob, DEAD_LETTER_MARKER, JobRecord, truncate_error};
pub use self::job_type::JobType;
pub use self::retry::RetryPolicy;
pub use self::state::JobStatus;
