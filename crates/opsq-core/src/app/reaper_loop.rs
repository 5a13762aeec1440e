//! ReaperLoop - lease 期限切れジョブの回収
//!
//! `interval` ごとに `reap_stuck_jobs()` を呼ぶ。複数プロセスで同時に動いても、
//! 1 行を回収するのは 1 回だけ（ストア側の行ロックで保証）。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::sleep_or_shutdown;
use crate::config::ReaperConfig;
use crate::error::QueueError;
use crate::ports::OpsStore;

pub struct ReaperLoop {
    store: Arc<dyn OpsStore>,
    lease_timeout_minutes: u32,
    interval: Duration,
}

impl ReaperLoop {
    pub fn new(store: Arc<dyn OpsStore>, config: &ReaperConfig) -> Self {
        Self {
            store,
            lease_timeout_minutes: config.lease_timeout_minutes,
            interval: config.interval(),
        }
    }

    pub async fn sweep(&self) -> Result<u64, QueueError> {
        self.store.reap_stuck_jobs(self.lease_timeout_minutes).await
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.interval, lease_timeout_minutes = self.lease_timeout_minutes, "reaper started");
        loop {
            if sleep_or_shutdown(&mut shutdown, self.interval).await {
                break;
            }
            match self.sweep().await {
                Ok(0) => debug!("reaper sweep found nothing"),
                Ok(reaped) => info!(reaped, "reaper sweep recovered stuck jobs"),
                Err(err) => warn!(error = %err, "reaper sweep failed"),
            }
        }
        info!("reaper stopped");
    }
}
