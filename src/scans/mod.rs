//! Scan lifecycle state machine.
//!
//! Scans move `Pending → Discovered → InProgress → {Done, Failed}`, with
//! `Aborted` reachable from any non-terminal state. Each reconcile reads the
//! scan fresh from the store, force-fails it if it has exceeded its
//! wall-clock budget, and then dispatches on the current state. Terminal
//! scans are never touched again.


use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, trace, warn};

use crate::processor::{AssetScanProcessor, ProcessorError};
use crate::store::{
    AssetQuery, AssetScanPatch, AssetScanQuery, ScanPatch, ScanQuery, Store, StoreError,
};
use crate::types::{
    AssetScan, AssetScanState, AssetScanStatus, AssetScanStatusReason, Scan, ScanId, ScanState,
    ScanStatus, ScanStatusReason, ScanSummary,
};
use crate::watch::{DiscoverySource, ReconcileHandler};

/// Identity of a scan needing reconciliation. Dedup key for the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanReconcileEvent {
    pub scan_id: ScanId,
}

#[derive(Debug, Error)]
pub enum ScanWatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error("failed to create {failed} of {total} asset scans for scan {scan_id}")]
    AssetScanCreation {
        scan_id: ScanId,
        failed: usize,
        total: usize,
    },

    #[error("failed to abort {failed} asset scans for scan {scan_id}")]
    AbortPropagation { scan_id: ScanId, failed: usize },
}

/// Discovers non-terminal scans and drives their state machine.
pub struct ScanWatcher<S> {
    store: Arc<S>,
    processor: Arc<AssetScanProcessor<S>>,
    scan_timeout: Duration,
}

impl<S: Store> ScanWatcher<S> {
    pub fn new(store: Arc<S>, processor: Arc<AssetScanProcessor<S>>, scan_timeout: Duration) -> Self {
        ScanWatcher {
            store,
            processor,
            scan_timeout,
        }
    }

    #[instrument(skip(self), fields(scan = %event.scan_id))]
    async fn reconcile_scan(&self, event: ScanReconcileEvent) -> Result<(), ScanWatchError> {
        let mut scan = self.store.get_scan(&event.scan_id).await?;

        // Wall-clock budget check comes before any state dispatch.
        if !scan.status.state.is_terminal() && scan.is_timed_out(self.scan_timeout) {
            scan.status = ScanStatus::new(
                ScanState::Failed,
                ScanStatusReason::Timeout,
                Some("Scan has timed out".to_owned()),
            );
            self.store
                .patch_scan(
                    &scan.id,
                    ScanPatch {
                        status: Some(scan.status.clone()),
                        ..Default::default()
                    },
                )
                .await?;
        }

        trace!(state = ?scan.status.state, "reconciling scan");
        match scan.status.state {
            ScanState::Pending => self.reconcile_pending(&scan).await,
            ScanState::Discovered => self.reconcile_discovered(&scan).await,
            ScanState::InProgress => self.reconcile_in_progress(&scan).await,
            ScanState::Aborted => self.reconcile_aborted(&scan).await,
            ScanState::Done | ScanState::Failed => {
                debug!("scan already finished, nothing to reconcile");
                Ok(())
            }
        }
    }

    /// Pending: resolve the scope into a concrete asset list. Terminated
    /// assets are historic and never scanned. An empty result finishes the
    /// scan immediately.
    async fn reconcile_pending(&self, scan: &Scan) -> Result<(), ScanWatchError> {
        let assets = self
            .store
            .list_assets(AssetQuery {
                not_terminated: true,
                scope: scan.scope.clone(),
                ..Default::default()
            })
            .await?;

        let asset_ids: Vec<_> = assets.items.into_iter().map(|a| a.id).collect();
        debug!(assets = asset_ids.len(), "discovered assets for scan");

        let patch = if asset_ids.is_empty() {
            ScanPatch {
                status: Some(ScanStatus::new(
                    ScanState::Done,
                    ScanStatusReason::NothingToScan,
                    Some("No assets found in scope for scan".to_owned()),
                )),
                ..Default::default()
            }
        } else {
            ScanPatch {
                status: Some(ScanStatus::new(
                    ScanState::Discovered,
                    ScanStatusReason::AssetsDiscovered,
                    Some("Assets for scan successfully discovered".to_owned()),
                )),
                asset_ids: Some(asset_ids),
                ..Default::default()
            }
        };
        self.store.patch_scan(&scan.id, patch).await?;
        Ok(())
    }

    /// Discovered: create one AssetScan per asset, tolerating ones that
    /// already exist, then move to InProgress.
    async fn reconcile_discovered(&self, scan: &Scan) -> Result<(), ScanWatchError> {
        let asset_ids = scan.asset_ids.clone().unwrap_or_default();
        let total = asset_ids.len();

        // Fan-out is scan-local and capped at the asset count.
        let mut creations: JoinSet<Result<(), StoreError>> = JoinSet::new();
        for asset_id in asset_ids {
            let store = self.store.clone();
            let asset_scan = AssetScan::new_for_asset(scan, asset_id);
            creations.spawn(async move {
                match store.create_asset_scan(asset_scan).await {
                    Ok(_) => Ok(()),
                    Err(StoreError::AssetScanExists(existing)) => {
                        debug!(asset_scan = %existing.id, "asset scan already exists");
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            });
        }

        let mut failed = 0usize;
        while let Some(joined) = creations.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!(%error, "failed to create asset scan");
                    failed += 1;
                }
                Err(error) => {
                    warn!(%error, "asset scan creation task panicked");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            // Stay in Discovered; the next poll retries creation and the
            // conflict handling above makes that idempotent.
            return Err(ScanWatchError::AssetScanCreation {
                scan_id: scan.id.clone(),
                failed,
                total,
            });
        }

        let summary = ScanSummary {
            jobs_left_to_run: total as u64,
            ..Default::default()
        };
        self.store
            .patch_scan(
                &scan.id,
                ScanPatch {
                    status: Some(ScanStatus::new(
                        ScanState::InProgress,
                        ScanStatusReason::AssetScansRunning,
                        None,
                    )),
                    summary: Some(summary),
                    ..Default::default()
                },
            )
            .await?;
        info!(total, "asset scans running for scan");
        Ok(())
    }

    /// InProgress: hand completed asset scans to the finding processor,
    /// recompute the summary from scratch, and finish the scan once no jobs
    /// are left.
    async fn reconcile_in_progress(&self, scan: &Scan) -> Result<(), ScanWatchError> {
        let asset_scans = self
            .store
            .list_asset_scans(AssetScanQuery {
                scan_id: Some(scan.id.clone()),
                ..Default::default()
            })
            .await?
            .items;

        // Findings first: if processing fails the scan must stay InProgress
        // so the next poll can retry before the scan goes terminal.
        for asset_scan in &asset_scans {
            if asset_scan.status.state == AssetScanState::Done && !asset_scan.findings_processed {
                self.processor.process(&asset_scan.id).await?;
                self.store
                    .patch_asset_scan(
                        &asset_scan.id,
                        AssetScanPatch {
                            findings_processed: Some(true),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
        }

        let (summary, failed) = fold_summary(&asset_scans);
        trace!(
            jobs_completed = summary.jobs_completed,
            jobs_left_to_run = summary.jobs_left_to_run,
            "scan summary recomputed"
        );

        let mut patch = ScanPatch {
            summary: Some(summary.clone()),
            ..Default::default()
        };
        if summary.jobs_left_to_run == 0 {
            let total = asset_scans.len() as u64;
            let message = format!(
                "{} succeeded, {} failed out of {} total asset scans",
                total - failed,
                failed,
                total
            );
            patch.status = Some(if failed > 0 {
                ScanStatus::new(ScanState::Failed, ScanStatusReason::Error, Some(message))
            } else {
                ScanStatus::new(ScanState::Done, ScanStatusReason::Success, Some(message))
            });
            patch.end_time = Some(chrono::Utc::now());
        }
        self.store.patch_scan(&scan.id, patch).await?;
        Ok(())
    }

    /// Aborted: propagate cancellation to every asset scan that can still be
    /// stopped, then fail the scan. The scan only goes terminal once every
    /// propagation has succeeded.
    async fn reconcile_aborted(&self, scan: &Scan) -> Result<(), ScanWatchError> {
        let to_abort = self
            .store
            .list_asset_scans(AssetScanQuery {
                scan_id: Some(scan.id.clone()),
                exclude_states: vec![
                    AssetScanState::Aborted,
                    AssetScanState::Done,
                    AssetScanState::Failed,
                ],
                ..Default::default()
            })
            .await?
            .items;

        if !to_abort.is_empty() {
            let mut patches: JoinSet<Result<(), StoreError>> = JoinSet::new();
            for asset_scan in to_abort {
                let store = self.store.clone();
                patches.spawn(async move {
                    store
                        .patch_asset_scan(
                            &asset_scan.id,
                            AssetScanPatch {
                                status: Some(AssetScanStatus::new(
                                    AssetScanState::Aborted,
                                    AssetScanStatusReason::Cancellation,
                                    None,
                                )),
                                ..Default::default()
                            },
                        )
                        .await
                });
            }

            let mut failed = 0usize;
            while let Some(joined) = patches.join_next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => {
                        warn!(%error, "failed to abort asset scan");
                        failed += 1;
                    }
                    Err(error) => {
                        warn!(%error, "abort propagation task panicked");
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                return Err(ScanWatchError::AbortPropagation {
                    scan_id: scan.id.clone(),
                    failed,
                });
            }
        }

        self.store
            .patch_scan(
                &scan.id,
                ScanPatch {
                    status: Some(ScanStatus::new(
                        ScanState::Failed,
                        ScanStatusReason::Cancellation,
                        Some("Scan has been aborted".to_owned()),
                    )),
                    end_time: Some(chrono::Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }
}

impl<S: Store> DiscoverySource for ScanWatcher<S> {
    type Item = ScanReconcileEvent;
    type Error = ScanWatchError;

    async fn discover(&self, _queued: usize) -> Result<Vec<ScanReconcileEvent>, ScanWatchError> {
        let scans = self
            .store
            .list_scans(ScanQuery {
                exclude_states: vec![ScanState::Done, ScanState::Failed],
                ..Default::default()
            })
            .await?;

        let mut events = Vec::with_capacity(scans.items.len());
        for scan in scans.items {
            if scan.id.as_str().is_empty() {
                warn!("skipping scan record without an id");
                continue;
            }
            events.push(ScanReconcileEvent { scan_id: scan.id });
        }
        Ok(events)
    }
}

impl<S: Store> ReconcileHandler for ScanWatcher<S> {
    type Item = ScanReconcileEvent;
    type Error = ScanWatchError;

    async fn reconcile(&self, event: ScanReconcileEvent) -> Result<(), ScanWatchError> {
        self.reconcile_scan(event).await
    }
}

/// Folds every asset scan's status and summary into a fresh scan summary.
///
/// Terminal asset scans count as completed jobs; only `Done` ones contribute
/// their per-category totals. Everything else still has a job left to run.
/// Returns the summary and the number of failed asset scans.
fn fold_summary(asset_scans: &[AssetScan]) -> (ScanSummary, u64) {
    let mut summary = ScanSummary::default();
    let mut failed = 0u64;
    for asset_scan in asset_scans {
        match asset_scan.status.state {
            AssetScanState::Done => {
                summary.jobs_completed += 1;
                let totals = &asset_scan.summary;
                summary.total_packages += totals.total_packages;
                summary
                    .total_vulnerabilities
                    .add(&totals.total_vulnerabilities);
                summary.total_secrets += totals.total_secrets;
                summary.total_malware += totals.total_malware;
                summary.total_misconfigurations += totals.total_misconfigurations;
                summary.total_rootkits += totals.total_rootkits;
                summary.total_exploits += totals.total_exploits;
                summary.total_info_finder += totals.total_info_finder;
                summary.total_plugins += totals.total_plugins;
            }
            AssetScanState::Failed => {
                summary.jobs_completed += 1;
                failed += 1;
            }
            AssetScanState::Pending
            | AssetScanState::Scheduled
            | AssetScanState::InProgress
            | AssetScanState::Aborted => {
                summary.jobs_left_to_run += 1;
            }
        }
    }
    (summary, failed)
}
