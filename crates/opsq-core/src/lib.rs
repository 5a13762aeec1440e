//! opsq-core
//!
//! Relational, lease-based job queue: enqueue, atomic claim with a lease,
//! status reports with backoff and dead-lettering, worker heartbeats, a
//! reaper for abandoned leases, and read-only health views.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（JobId, JobType, JobStatus, JobRecord, RetryPolicy, heartbeat）
//! - **ports**: 抽象化レイヤー（JobStore, HeartbeatRegistry, HealthViews, Clock, IdGenerator）
//! - **impls**: 実装（InMemoryJobStore, PostgresJobStore）
//! - **typed**: 型付きジョブ API（JobPayload, Handler, TypedRegistry）
//! - **app**: ワーカー側ループ（WorkerLoop, HeartbeatLoop, ReaperLoop, WorkerGroup）
//! - **observability**: HealthReport と tracing 初期化
//! - **config**: serde 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod typed;

pub use crate::config::OpsConfig;
pub use crate::domain::{ClaimedJob, JobId, JobRecord, JobStatus, JobType};
pub use crate::error::QueueError;
pub use crate::impls::InMemoryJobStore;
pub use crate::observability::HealthReport;
pub use crate::ports::{HealthViews, HeartbeatRegistry, JobStore, OpsStore};
