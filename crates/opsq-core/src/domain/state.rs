//! Job status: the closed set of states a job row can be in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job status.
///
/// State transitions:
/// - pending -> processing (claim)
/// - processing -> completed (worker reports success)
/// - processing -> pending (failure with attempts left, or reaped)
/// - processing -> failed (attempts exhausted: dead-lettered)
///
/// `failed` is only ever entered through the dead-letter path, so every
/// `failed` row is a dead letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal rows never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Can a worker report this status through `update_job_status`?
    pub fn is_reportable(self) -> bool {
        self.is_terminal()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("pending", JobStatus::Pending)]
    #[case("processing", JobStatus::Processing)]
    #[case("completed", JobStatus::Completed)]
    #[case("failed", JobStatus::Failed)]
    fn parses_wire_names(#[case] raw: &str, #[case] expected: JobStatus) {
        assert_eq!(raw.parse::<JobStatus>().unwrap(), expected);
        assert_eq!(expected.to_string(), raw);
    }

    #[test]
    fn rejects_unknown_names() {
        assert_eq!(
            "dead".parse::<JobStatus>(),
            Err(UnknownStatus("dead".to_string()))
        );
        assert!("Completed".parse::<JobStatus>().is_err());
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn serde_uses_lower_case() {
        let s = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(s, "\"processing\"");
    }
}
