//! IdGenerator port - JobId の採番
//!
//! ULID の timestamp 部には Clock の時刻を使う。同一ミリ秒内でも
//! 単調増加するので、ID の並びは採番順と一致する。

use std::sync::Mutex;
use std::time::SystemTime;

use ulid::{Generator, Ulid};

use crate::domain::JobId;
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;
}

pub struct UlidGenerator<C> {
    clock: C,
    monotonic: Mutex<Generator>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            monotonic: Mutex::new(Generator::new()),
        }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        let now = self.clock.now();
        let mut monotonic = self
            .monotonic
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Overflow of the random part within one millisecond: fall back to a
        // fresh random ULID for the same instant.
        let ulid = monotonic
            .generate_from_datetime(SystemTime::from(now))
            .unwrap_or_else(|_| {
                Ulid::from_parts(now.timestamp_millis().max(0) as u64, rand::random())
            });
        JobId::from(ulid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ids_are_unique() {
        let id_gen = UlidGenerator::new(SystemClock);
        let ids: Vec<JobId> = (0..100).map(|_| id_gen.generate_job_id()).collect();
        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[test]
    fn fixed_clock_ids_share_timestamp_and_increase() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let ids: Vec<JobId> = (0..10).map(|_| id_gen.generate_job_id()).collect();

        for id in &ids {
            assert_eq!(id.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        }
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }
}
