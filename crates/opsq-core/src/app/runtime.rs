use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::heartbeat_loop::HeartbeatLoop;
use super::reaper_loop::ReaperLoop;
use super::worker_loop::WorkerLoop;
use crate::config::OpsConfig;
use crate::ports::OpsStore;
use crate::typed::TypedRegistry;

/// Worker group handle.
/// - `concurrency` 本の WorkerLoop + HeartbeatLoop 1 本 + ReaperLoop 1 本
/// - `shutdown_and_join()` で新規 claim を止め、実行中のジョブの完了を待つ
pub struct WorkerGroup {
    process_id: String,
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    pub fn spawn(store: Arc<dyn OpsStore>, registry: Arc<TypedRegistry>, config: &OpsConfig) -> Self {
        let process_id = format!(
            "{}-{}-{}",
            config.worker.worker_id_prefix,
            config.worker.hostname,
            std::process::id()
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let workers = config.worker.concurrency.max(1);

        let mut joins = Vec::with_capacity(workers + 2);
        for n in 0..workers {
            let worker = WorkerLoop::new(
                format!("{process_id}-{n}"),
                Arc::clone(&store),
                Arc::clone(&registry),
                &config.worker,
            );
            joins.push(tokio::spawn(worker.run(shutdown_rx.clone())));
        }

        let heartbeat = HeartbeatLoop::new(process_id.clone(), Arc::clone(&store), &config.worker);
        joins.push(tokio::spawn(heartbeat.run(shutdown_rx.clone())));

        let reaper = ReaperLoop::new(store, &config.reaper);
        joins.push(tokio::spawn(reaper.run(shutdown_rx)));

        info!(process_id = %process_id, workers, "worker group started");
        Self {
            process_id,
            shutdown_tx,
            joins,
        }
    }

    /// Heartbeat の worker_id（ワーカーは `{process_id}-{n}`）
    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Stop taking new leases. In-flight handlers are not cancelled.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                warn!(process_id = %self.process_id, error = %err, "loop task ended abnormally");
            }
        }
        info!(process_id = %self.process_id, "worker group stopped");
    }
}
