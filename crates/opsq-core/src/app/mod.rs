//! App - アプリケーション層
//!
//! ports を組み合わせてワーカープロセスを構成します。
//!
//! # 主要コンポーネント
//! - **AppBuilder / App**: Handler 登録と起動時検証
//! - **WorkerLoop**: claim → handle → update_job_status のポーリングループ
//! - **HeartbeatLoop**: プロセスの生存報告
//! - **ReaperLoop**: lease 期限切れジョブの回収
//! - **WorkerGroup**: 上記をまとめて spawn / shutdown

pub mod builder;
pub mod heartbeat_loop;
pub mod reaper_loop;
pub mod runtime;
pub mod worker_loop;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::heartbeat_loop::HeartbeatLoop;
pub use self::reaper_loop::ReaperLoop;
pub use self::runtime::WorkerGroup;
pub use self::worker_loop::{CycleError, WorkerLoop};

use std::time::Duration;

use tokio::sync::watch;

/// `interval` だけ待つ。shutdown が要求された（または送信側が drop された）ら true。
pub(crate) async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        _ = tokio::time::sleep(interval) => false,
    }
}
