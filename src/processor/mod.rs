//! Translation of completed asset-scan results into the finding store.
//!
//! Processing is idempotent: create conflicts are resolved by comparing scan
//! completion times (last writer wins), supersession is recorded by setting
//! `invalidated_on` rather than deleting, and the asset's per-category
//! summary is recounted from active findings every time.

pub mod extract;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, instrument, trace};

use crate::store::{AssetPatch, FindingPatch, FindingQuery, PageRequest, Store, StoreError};
use crate::types::{
    AssetId, AssetScan, AssetScanId, AssetScanState, Finding, FindingCategory, FindingId,
    FindingInfo, Severity, VulnerabilitySeveritySummary,
};

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("asset scan {0} has not completed successfully")]
    NotCompleted(AssetScanId),
}

/// Turns one completed AssetScan into finding create/patch operations.
pub struct AssetScanProcessor<S> {
    store: Arc<S>,
}

impl<S: Store> AssetScanProcessor<S> {
    pub fn new(store: Arc<S>) -> Self {
        AssetScanProcessor { store }
    }

    /// Processes the results of a `Done` asset scan. Safe to call again for
    /// the same asset scan after a crash or partial failure.
    #[instrument(skip(self), fields(asset_scan = %asset_scan_id))]
    pub async fn process(&self, asset_scan_id: &AssetScanId) -> Result<(), ProcessorError> {
        let asset_scan = self.store.get_asset_scan(asset_scan_id).await?;
        if asset_scan.status.state != AssetScanState::Done {
            return Err(ProcessorError::NotCompleted(asset_scan_id.clone()));
        }
        let completed = asset_scan.status.last_transition_time;

        for (category, infos) in extract::extract_findings(&asset_scan) {
            debug!(%category, findings = infos.len(), "reconciling findings");
            self.reconcile_category(&asset_scan, category, infos, completed)
                .await?;
        }
        Ok(())
    }

    async fn reconcile_category(
        &self,
        asset_scan: &AssetScan,
        category: FindingCategory,
        infos: Vec<FindingInfo>,
        completed: DateTime<Utc>,
    ) -> Result<(), ProcessorError> {
        // Some categories guard against out-of-order processing: when an even
        // newer scan of this asset has already been processed, findings from
        // this scan are created pre-invalidated at that scan's time.
        let newer = match category {
            FindingCategory::Misconfiguration | FindingCategory::Rootkit => {
                self.newer_existing_finding_time(&asset_scan.asset_id, category, completed)
                    .await?
            }
            FindingCategory::Package
            | FindingCategory::Vulnerability
            | FindingCategory::Secret
            | FindingCategory::Malware
            | FindingCategory::Exploit
            | FindingCategory::InfoFinder
            | FindingCategory::Plugin => None,
        };

        for info in infos {
            self.create_or_update(asset_scan, info, completed, newer)
                .await?;
        }

        self.invalidate_older(category, &asset_scan.asset_id, completed)
            .await?;
        self.refresh_asset_summary(&asset_scan.asset_id, category)
            .await?;
        Ok(())
    }

    /// The `found_on` of the oldest finding of this category for this asset
    /// discovered after `completed`, if any.
    async fn newer_existing_finding_time(
        &self,
        asset_id: &AssetId,
        category: FindingCategory,
        completed: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ProcessorError> {
        let page = self
            .store
            .list_findings(FindingQuery {
                category: Some(category),
                asset_id: Some(asset_id.clone()),
                found_after: Some(completed),
                ..Default::default()
            })
            .await?;
        Ok(page.items.iter().map(|f| f.found_on).min())
    }

    /// Creates the finding, treating a key conflict as control flow: the
    /// existing finding is refreshed iff this scan completed after the scan
    /// that last saw it.
    async fn create_or_update(
        &self,
        asset_scan: &AssetScan,
        info: FindingInfo,
        completed: DateTime<Utc>,
        invalidated_on: Option<DateTime<Utc>>,
    ) -> Result<(), ProcessorError> {
        let finding = Finding {
            id: FindingId::new(""),
            asset_id: asset_scan.asset_id.clone(),
            found_by: asset_scan.id.clone(),
            found_on: completed,
            invalidated_on,
            last_seen: completed,
            last_seen_by: asset_scan.id.clone(),
            info: info.clone(),
            summary: None,
        };

        match self.store.create_finding(finding).await {
            Ok(_) => Ok(()),
            Err(StoreError::FindingExists(existing)) => {
                if existing.last_seen < completed {
                    // Bumping found_on as well keeps the reconfirmed finding
                    // out of this cycle's invalidation sweep.
                    self.store
                        .patch_finding(
                            &existing.id,
                            FindingPatch {
                                found_on: Some(completed),
                                last_seen: Some(completed),
                                last_seen_by: Some(asset_scan.id.clone()),
                                info: Some(info),
                                ..Default::default()
                            },
                        )
                        .await?;
                    trace!(finding = %existing.id, "refreshed existing finding");
                } else {
                    trace!(finding = %existing.id, "existing finding is newer, skipping");
                }
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Invalidates findings of this category for this asset that predate the
    /// scan and were not already invalidated by an older scan.
    async fn invalidate_older(
        &self,
        category: FindingCategory,
        asset_id: &AssetId,
        completed: DateTime<Utc>,
    ) -> Result<(), ProcessorError> {
        let stale = self
            .store
            .list_findings(FindingQuery {
                category: Some(category),
                asset_id: Some(asset_id.clone()),
                found_before: Some(completed),
                invalidated_after_or_null: Some(completed),
                ..Default::default()
            })
            .await?;

        for finding in stale.items {
            self.store
                .patch_finding(
                    &finding.id,
                    FindingPatch {
                        invalidated_on: Some(completed),
                        ..Default::default()
                    },
                )
                .await?;
        }
        Ok(())
    }

    /// Recounts the asset's summary field for one category from active
    /// findings. Vulnerabilities are counted per severity.
    async fn refresh_asset_summary(
        &self,
        asset_id: &AssetId,
        category: FindingCategory,
    ) -> Result<(), ProcessorError> {
        let asset = self.store.get_asset(asset_id).await?;
        let mut summary = asset.summary;

        match category {
            FindingCategory::Vulnerability => {
                let mut totals = VulnerabilitySeveritySummary::default();
                for severity in Severity::ALL {
                    let count = self
                        .store
                        .list_findings(FindingQuery {
                            category: Some(FindingCategory::Vulnerability),
                            asset_id: Some(asset_id.clone()),
                            active_only: true,
                            severity: Some(severity),
                            page: PageRequest::count_only(),
                            ..Default::default()
                        })
                        .await?
                        .count;
                    totals.set(severity, count as u64);
                }
                summary.total_vulnerabilities = totals;
            }
            FindingCategory::Package => {
                summary.total_packages = self.count_active(category, asset_id).await?;
            }
            FindingCategory::Secret => {
                summary.total_secrets = self.count_active(category, asset_id).await?;
            }
            FindingCategory::Malware => {
                summary.total_malware = self.count_active(category, asset_id).await?;
            }
            FindingCategory::Misconfiguration => {
                summary.total_misconfigurations = self.count_active(category, asset_id).await?;
            }
            FindingCategory::Rootkit => {
                summary.total_rootkits = self.count_active(category, asset_id).await?;
            }
            FindingCategory::Exploit => {
                summary.total_exploits = self.count_active(category, asset_id).await?;
            }
            FindingCategory::InfoFinder => {
                summary.total_info_finder = self.count_active(category, asset_id).await?;
            }
            FindingCategory::Plugin => {
                summary.total_plugins = self.count_active(category, asset_id).await?;
            }
        }

        self.store
            .patch_asset(
                asset_id,
                AssetPatch {
                    summary: Some(summary),
                },
            )
            .await?;
        Ok(())
    }

    async fn count_active(
        &self,
        category: FindingCategory,
        asset_id: &AssetId,
    ) -> Result<u64, ProcessorError> {
        let page = self
            .store
            .list_findings(FindingQuery {
                category: Some(category),
                asset_id: Some(asset_id.clone()),
                active_only: true,
                page: PageRequest::count_only(),
                ..Default::default()
            })
            .await?;
        Ok(page.count as u64)
    }
}
