//! JobType - the tag that routes a job to its handler.
//!
//! # 命名規約
//! - ASCII 英数字と `_`, `-`, `.` のみ
//! - 1..=64 バイト
//! - 例: `ingestion`, `enrichment`, `skip_trace`, `escalation.v2`

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::QueueError;

pub const MAX_JOB_TYPE_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobType(String);

impl JobType {
    /// Validate and wrap a tag. Surrounding whitespace is trimmed.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, QueueError> {
        let tag = raw.as_ref().trim();
        let valid = !tag.is_empty()
            && tag.len() <= MAX_JOB_TYPE_LEN
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(QueueError::InvalidJobType(raw.as_ref().to_string()));
        }
        Ok(Self(tag.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for JobType {
    type Error = QueueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        JobType::new(value)
    }
}

impl From<JobType> for String {
    fn from(value: JobType) -> Self {
        value.0
    }
}

impl AsRef<str> for JobType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
