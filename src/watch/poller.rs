//! Periodic discovery loop feeding the reconcile queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::queue::ReconcileQueue;
use super::DiscoverySource;

/// Runs [`DiscoverySource::discover`] on a fixed interval and enqueues the
/// results.
///
/// Discovery errors are logged and the cycle is skipped; the backlog is
/// picked up again on the next tick. A single slow cycle is bounded by
/// `cycle_timeout`.
pub struct Poller<S: DiscoverySource> {
    source: Arc<S>,
    queue: Arc<ReconcileQueue<S::Item>>,
    interval: Duration,
    cycle_timeout: Duration,
    cancel: CancellationToken,
}

impl<S: DiscoverySource> Poller<S> {
    pub fn new(
        source: Arc<S>,
        queue: Arc<ReconcileQueue<S::Item>>,
        interval: Duration,
        cycle_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Poller {
            source,
            queue,
            interval,
            cycle_timeout,
            cancel,
        }
    }

    /// Spawns the poll loop. The task exits when the cancellation token
    /// fires.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!("poller shutting down");
                    return;
                }
                _ = ticker.tick() => self.poll_once().await,
            }
        }
    }

    async fn poll_once(&self) {
        let queued = self.queue.len();
        let discovered = tokio::time::timeout(self.cycle_timeout, self.source.discover(queued));
        match discovered.await {
            Ok(Ok(items)) => {
                let total = items.len();
                let mut enqueued = 0usize;
                for item in items {
                    if self.queue.enqueue(item) {
                        enqueued += 1;
                    }
                }
                trace!(total, enqueued, "poll cycle complete");
            }
            Ok(Err(error)) => {
                warn!(%error, "discovery failed, will retry next cycle");
            }
            Err(_) => {
                warn!(timeout = ?self.cycle_timeout, "discovery timed out, will retry next cycle");
            }
        }
    }
}
