//! HeartbeatLoop - ワーカープロセスの生存報告
//!
//! `heartbeat_interval` ごとに `running` を upsert し、shutdown 時に `stopped` を書く。
//! 書き込み失敗はログに残すだけでジョブ処理には影響させない。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::sleep_or_shutdown;
use crate::config::WorkerConfig;
use crate::domain::heartbeat::STOPPED_STATUS;
use crate::error::QueueError;
use crate::ports::OpsStore;

const RUNNING_STATUS: &str = "running";

pub struct HeartbeatLoop {
    store: Arc<dyn OpsStore>,
    worker_id: String,
    worker_type: String,
    hostname: String,
    interval: Duration,
}

impl HeartbeatLoop {
    pub fn new(worker_id: impl Into<String>, store: Arc<dyn OpsStore>, config: &WorkerConfig) -> Self {
        Self {
            store,
            worker_id: worker_id.into(),
            worker_type: config.worker_type.clone(),
            hostname: config.hostname.clone(),
            interval: config.heartbeat_interval(),
        }
    }

    pub async fn beat(&self, status: &str) -> Result<(), QueueError> {
        self.store
            .register_heartbeat(&self.worker_id, &self.worker_type, &self.hostname, status)
            .await
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            match self.beat(RUNNING_STATUS).await {
                Ok(()) => debug!(worker_id = %self.worker_id, "heartbeat"),
                Err(err) => warn!(worker_id = %self.worker_id, error = %err, "heartbeat write failed"),
            }
            if sleep_or_shutdown(&mut shutdown, self.interval).await {
                break;
            }
        }
        if let Err(err) = self.beat(STOPPED_STATUS).await {
            warn!(worker_id = %self.worker_id, error = %err, "final heartbeat write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::impls::InMemoryJobStore;
    use crate::ports::HeartbeatRegistry;

    #[tokio::test]
    async fn writes_running_then_stopped() {
        let store = Arc::new(InMemoryJobStore::new(QueueConfig::default()));
        let config = WorkerConfig {
            heartbeat_interval_secs: 3600,
            ..WorkerConfig::default()
        };
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(HeartbeatLoop::new("proc-1", store.clone(), &config).run(rx));

        // First beat is written before the loop starts waiting.
        let mut beats = Vec::new();
        for _ in 0..50 {
            beats = store.heartbeats().await.unwrap();
            if !beats.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(beats[0].status, "running");
        assert_eq!(beats[0].worker_type, config.worker_type);

        tx.send(true).unwrap();
        handle.await.unwrap();
        let beats = store.heartbeats().await.unwrap();
        assert_eq!(beats[0].status, "stopped");
    }
}
