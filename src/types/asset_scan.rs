//! The AssetScan entity: the unit of scanning work for one (Scan, Asset)
//! pair.
//!
//! AssetScans are created by the Scan state machine at the Discovered
//! transition and driven through their own status machine by an external
//! scanner runner. The reconciliation core only observes their status and
//! consumes their results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::finding::{
    Exploit, InfoFinder, Malware, Misconfiguration, Package, PluginFinding, Rootkit, Secret,
    Vulnerability,
};
use super::ids::{AssetId, AssetScanId, ScanId};
use super::scan::{Scan, ScanFamiliesConfig};
use super::severity::VulnerabilitySeveritySummary;

/// Lifecycle state of an AssetScan, owned by the external scanner runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetScanState {
    Pending,
    Scheduled,
    InProgress,
    Aborted,
    Done,
    Failed,
}

impl AssetScanState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AssetScanState::Done | AssetScanState::Failed)
    }
}

/// Machine-readable reason for the current asset-scan status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetScanStatusReason {
    Created,
    Provisioning,
    ScannerRunning,
    Cancellation,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetScanStatus {
    pub state: AssetScanState,
    pub reason: AssetScanStatusReason,
    pub message: Option<String>,

    /// For terminal states this is the scan's completion time, which anchors
    /// all finding supersession decisions.
    pub last_transition_time: DateTime<Utc>,
}

impl AssetScanStatus {
    pub fn new(
        state: AssetScanState,
        reason: AssetScanStatusReason,
        message: Option<String>,
    ) -> Self {
        AssetScanStatus {
            state,
            reason,
            message,
            last_transition_time: Utc::now(),
        }
    }
}

/// Raw per-family results attached by the scanner runner.
///
/// A `None` family means the family did not run (disabled or not yet
/// reported); an empty `Some` means it ran and found nothing. The processor
/// only reconciles families that actually ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetScanResults {
    pub packages: Option<Vec<Package>>,
    pub vulnerabilities: Option<Vec<Vulnerability>>,
    pub secrets: Option<Vec<Secret>>,
    pub malware: Option<Vec<Malware>>,
    pub misconfigurations: Option<Vec<Misconfiguration>>,
    pub rootkits: Option<Vec<Rootkit>>,
    pub exploits: Option<Vec<Exploit>>,
    pub info_finder: Option<Vec<InfoFinder>>,
    pub plugins: Option<Vec<PluginFinding>>,
}

/// Per-category totals reported by the scanner runner for one asset scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetScanSummary {
    pub total_packages: u64,
    pub total_vulnerabilities: VulnerabilitySeveritySummary,
    pub total_secrets: u64,
    pub total_malware: u64,
    pub total_misconfigurations: u64,
    pub total_rootkits: u64,
    pub total_exploits: u64,
    pub total_info_finder: u64,
    pub total_plugins: u64,
}

/// A persisted AssetScan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetScan {
    pub id: AssetScanId,
    pub scan_id: ScanId,
    pub asset_id: AssetId,
    pub families: ScanFamiliesConfig,
    pub status: AssetScanStatus,
    pub summary: AssetScanSummary,
    pub results: AssetScanResults,

    /// Set once the asset-scan processor has translated this scan's results
    /// into findings. Makes "process once per completed asset scan" safe to
    /// re-derive after a crash.
    pub findings_processed: bool,
}

impl AssetScan {
    /// Builds the initial AssetScan for one asset of a scan: `Pending` status,
    /// zeroed summary, the scan's family configuration, and no results.
    ///
    /// The ID is assigned by the store on create.
    pub fn new_for_asset(scan: &Scan, asset_id: AssetId) -> Self {
        AssetScan {
            id: AssetScanId::new(""),
            scan_id: scan.id.clone(),
            asset_id,
            families: scan.families.clone(),
            status: AssetScanStatus::new(
                AssetScanState::Pending,
                AssetScanStatusReason::Created,
                None,
            ),
            summary: AssetScanSummary::default(),
            results: AssetScanResults::default(),
            findings_processed: false,
        }
    }
}
