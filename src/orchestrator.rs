//! Wiring of the watchers into running pollers and worker pools.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::OrchestratorConfig;
use crate::findings::FindingWatcher;
use crate::processor::AssetScanProcessor;
use crate::provider::ProviderRegistry;
use crate::scans::ScanWatcher;
use crate::store::Store;
use crate::watch::{Poller, ReconcilePool, ReconcileQueue};

/// Owns the scan and finding watch pipelines and their shared shutdown
/// token.
pub struct Orchestrator<S> {
    store: Arc<S>,
    providers: Arc<ProviderRegistry>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl<S: Store> Orchestrator<S> {
    pub fn new(
        store: Arc<S>,
        providers: Arc<ProviderRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Orchestrator {
            store,
            providers,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token to cancel for graceful shutdown; every poller and worker is a
    /// child of it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs both watch pipelines until the cancellation token fires and all
    /// workers have drained.
    pub async fn run(self) {
        info!(
            providers = ?self.providers.kinds(),
            workers = self.config.worker_count,
            "orchestrator starting"
        );

        let scan_watcher = Arc::new(ScanWatcher::new(
            self.store.clone(),
            Arc::new(AssetScanProcessor::new(self.store.clone())),
            self.config.scan_timeout,
        ));
        let scan_queue = Arc::new(ReconcileQueue::new());
        let scan_poller = Poller::new(
            scan_watcher.clone(),
            scan_queue.clone(),
            self.config.poll_period,
            self.config.reconcile_timeout,
            self.cancel.child_token(),
        )
        .spawn();
        let scan_pool = ReconcilePool::new(
            scan_watcher,
            scan_queue,
            self.config.worker_count,
            self.config.reconcile_timeout,
            self.cancel.child_token(),
        )
        .spawn();

        let finding_watcher = Arc::new(FindingWatcher::new(
            self.store.clone(),
            self.config.summary_update_period,
            self.config.max_processing_count,
        ));
        let finding_queue = Arc::new(ReconcileQueue::new());
        let finding_poller = Poller::new(
            finding_watcher.clone(),
            finding_queue.clone(),
            self.config.poll_period,
            self.config.reconcile_timeout,
            self.cancel.child_token(),
        )
        .spawn();
        let finding_pool = ReconcilePool::new(
            finding_watcher,
            finding_queue,
            self.config.worker_count,
            self.config.reconcile_timeout,
            self.cancel.child_token(),
        )
        .spawn();

        for handle in [scan_poller, scan_pool, finding_poller, finding_pool] {
            // Watch tasks never panic in normal operation; a join error here
            // means a bug, so surface it loudly.
            if let Err(error) = handle.await {
                tracing::error!(%error, "watch task aborted");
            }
        }
        info!("orchestrator stopped");
    }
}
