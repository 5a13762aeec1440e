//! Ports - 抽象化レイヤー
//!
//! ジョブストア・ハートビート・ヘルスビューと、時刻/ID 生成の trait を定義します。
//! 実装は `impls` にあります（in-memory と PostgreSQL）。

pub mod clock;
pub mod id_generator;
pub mod job_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::{HealthViews, HeartbeatRegistry, JobStore, OpsStore};
