use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::worker_loop::WorkerLoop;

/// Worker group handle.
/// - `shutdown_tx` を drop するとワーカー全体が止まる
/// - `join()` で全ワーカーの終了を待てる
///
/// Each loop keeps its own broker handle; the group shares nothing but the
/// shutdown signal.
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn one tokio task per worker loop.
    pub fn spawn(workers: Vec<WorkerLoop>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = workers
            .into_iter()
            .map(|worker| tokio::spawn(worker.run(shutdown_rx.clone())))
            .collect::<Vec<_>>();
        info!(workers = joins.len(), "worker group started");

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Request shutdown for all workers.
    /// This does not cancel an in-flight poll or handler; each worker stops
    /// before its next poll.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for all workers without requesting shutdown.
    pub async fn join(self) {
        for j in self.joins {
            if let Err(e) = j.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        self.join().await;
    }
}
