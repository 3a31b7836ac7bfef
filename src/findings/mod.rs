//! Finding summary watcher.
//!
//! Package findings carry a derived summary of how many vulnerability
//! findings affect that package, per severity. Only Package findings are
//! refreshed; other categories have no vulnerability linkage. The watcher
//! discovers findings whose summary is missing or older than the update
//! period and recomputes it with one count query per severity.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::store::{FindingPatch, FindingQuery, PageRequest, Store, StoreError};
use crate::types::{
    FindingCategory, FindingId, FindingInfo, FindingSummary, Package, Severity,
    VulnerabilitySeveritySummary,
};
use crate::watch::{DiscoverySource, ReconcileHandler};

/// Identity of a finding whose summary needs refreshing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FindingReconcileEvent {
    pub finding_id: FindingId,
}

#[derive(Debug, Error)]
pub enum FindingWatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Discovers stale-summary Package findings and recomputes their summaries.
pub struct FindingWatcher<S> {
    store: Arc<S>,
    summary_update_period: Duration,

    /// Cap on findings in the pipeline at once; discovery fetches at most
    /// this many minus whatever is already queued.
    max_processing_count: usize,
}

impl<S: Store> FindingWatcher<S> {
    pub fn new(store: Arc<S>, summary_update_period: Duration, max_processing_count: usize) -> Self {
        FindingWatcher {
            store,
            summary_update_period,
            max_processing_count,
        }
    }

    async fn reconcile_package_summary(
        &self,
        finding_id: &FindingId,
        package: &Package,
    ) -> Result<(), FindingWatchError> {
        let mut totals = VulnerabilitySeveritySummary::default();
        for severity in Severity::ALL {
            let count = self
                .store
                .list_findings(FindingQuery {
                    category: Some(FindingCategory::Vulnerability),
                    severity: Some(severity),
                    package: Some((package.name.clone(), package.version.clone())),
                    page: PageRequest::count_only(),
                    ..Default::default()
                })
                .await?
                .count;
            totals.set(severity, count as u64);
        }

        self.store
            .patch_finding(
                finding_id,
                FindingPatch {
                    summary: Some(FindingSummary {
                        updated_at: Utc::now(),
                        total_vulnerabilities: totals,
                    }),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }
}

impl<S: Store> DiscoverySource for FindingWatcher<S> {
    type Item = FindingReconcileEvent;
    type Error = FindingWatchError;

    async fn discover(&self, queued: usize) -> Result<Vec<FindingReconcileEvent>, FindingWatchError> {
        let budget = self.max_processing_count.saturating_sub(queued);
        if budget == 0 {
            debug!("summary refresh pipeline full, skipping discovery");
            return Ok(Vec::new());
        }

        let stale_before = Utc::now()
            - chrono::Duration::from_std(self.summary_update_period)
                .unwrap_or(chrono::Duration::MAX);
        let findings = self
            .store
            .list_findings(FindingQuery {
                category: Some(FindingCategory::Package),
                summary_stale_before: Some(stale_before),
                page: PageRequest {
                    top: Some(budget),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await?;

        let mut events = Vec::with_capacity(findings.items.len());
        for finding in findings.items {
            if finding.id.as_str().is_empty() {
                warn!("skipping finding record without an id");
                continue;
            }
            events.push(FindingReconcileEvent {
                finding_id: finding.id,
            });
        }
        Ok(events)
    }
}

impl<S: Store> ReconcileHandler for FindingWatcher<S> {
    type Item = FindingReconcileEvent;
    type Error = FindingWatchError;

    #[instrument(skip(self), fields(finding = %event.finding_id))]
    async fn reconcile(&self, event: FindingReconcileEvent) -> Result<(), FindingWatchError> {
        let finding = self.store.get_finding(&event.finding_id).await?;
        match &finding.info {
            FindingInfo::Package(package) => {
                self.reconcile_package_summary(&finding.id, package).await
            }
            FindingInfo::Vulnerability(_)
            | FindingInfo::Secret(_)
            | FindingInfo::Malware(_)
            | FindingInfo::Misconfiguration(_)
            | FindingInfo::Rootkit(_)
            | FindingInfo::Exploit(_)
            | FindingInfo::InfoFinder(_)
            | FindingInfo::Plugin(_) => {
                debug!("finding category carries no summary, nothing to do");
                Ok(())
            }
        }
    }
}
