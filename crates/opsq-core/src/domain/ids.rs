//! Job identifier.
//!
//! IDs are ULIDs: 128-bit, generated without coordination, and sortable by
//! creation time. The ULID timestamp is taken from the store's `Clock`, so a
//! fixed clock in tests yields IDs with a known timestamp component.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Display prefix, e.g. `job-01HZX...`.
const PREFIX: &str = "job-";

/// Identifier of a job, assigned at enqueue time and never changed.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Ulid);

impl JobId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for JobId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.0)
    }
}

/// Accepts both the prefixed display form and a bare ULID string.
impl FromStr for JobId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(PREFIX).unwrap_or(s);
        Ulid::from_string(raw).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_has_prefix_and_parses_back() {
        let id = JobId::from_ulid(Ulid::new());
        let shown = id.to_string();
        assert!(shown.starts_with("job-"));
        assert_eq!(shown.parse::<JobId>().unwrap(), id);
        assert_eq!(id.as_ulid().to_string().parse::<JobId>().unwrap(), id);
    }

    #[test]
    fn garbage_does_not_parse() {
        assert!("job-not-a-ulid".parse::<JobId>().is_err());
    }

    #[test]
    fn serializes_as_bare_ulid() {
        let ulid = Ulid::new();
        let id = JobId::from(ulid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{ulid}\""));
    }
}
