//! Worker pool draining the reconcile queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::queue::ReconcileQueue;
use super::ReconcileHandler;

/// A fixed pool of workers running a [`ReconcileHandler`].
///
/// Each reconcile is bounded by `reconcile_timeout`. Failures and timeouts
/// are logged and dropped; the entity is re-discovered on a later poll if it
/// still needs work.
pub struct ReconcilePool<H: ReconcileHandler> {
    handler: Arc<H>,
    queue: Arc<ReconcileQueue<H::Item>>,
    worker_count: usize,
    reconcile_timeout: Duration,
    cancel: CancellationToken,
}

impl<H: ReconcileHandler> ReconcilePool<H> {
    pub fn new(
        handler: Arc<H>,
        queue: Arc<ReconcileQueue<H::Item>>,
        worker_count: usize,
        reconcile_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        ReconcilePool {
            handler,
            queue,
            worker_count: worker_count.max(1),
            reconcile_timeout,
            cancel,
        }
    }

    /// Spawns the workers. The returned handle resolves once every worker
    /// has observed cancellation and drained out.
    pub fn spawn(self) -> JoinHandle<()> {
        let mut workers = JoinSet::new();
        for worker in 0..self.worker_count {
            let handler = self.handler.clone();
            let queue = self.queue.clone();
            let cancel = self.cancel.clone();
            let timeout = self.reconcile_timeout;
            workers.spawn(async move {
                worker_loop(worker, handler, queue, timeout, cancel).await;
            });
        }
        tokio::spawn(async move {
            while workers.join_next().await.is_some() {}
        })
    }
}

async fn worker_loop<H: ReconcileHandler>(
    worker: usize,
    handler: Arc<H>,
    queue: Arc<ReconcileQueue<H::Item>>,
    reconcile_timeout: Duration,
    cancel: CancellationToken,
) {
    loop {
        let Some(item) = queue.dequeue(&cancel).await else {
            debug!(worker, "reconcile worker shutting down");
            return;
        };
        let outcome = tokio::time::timeout(reconcile_timeout, handler.reconcile(item.clone()));
        match outcome.await {
            Ok(Ok(())) => trace!(worker, ?item, "reconciled"),
            Ok(Err(error)) => {
                warn!(worker, ?item, %error, "reconcile failed, awaiting re-discovery");
            }
            Err(_) => {
                warn!(
                    worker,
                    ?item,
                    timeout = ?reconcile_timeout,
                    "reconcile timed out, awaiting re-discovery"
                );
            }
        }
        queue.done(&item);
    }
}
