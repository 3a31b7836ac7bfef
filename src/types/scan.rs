//! The Scan entity and its lifecycle status.
//!
//! A Scan moves forward through `Pending -> Discovered -> InProgress ->
//! {Done, Failed}`. `Aborted` is reachable from any non-terminal state as an
//! external signal and resolves to `Failed` once abort propagation completes.
//! Terminal scans are never reconciled again.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::asset::Asset;
use super::ids::{AssetId, ScanId};
use super::severity::VulnerabilitySeveritySummary;

/// Lifecycle state of a Scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanState {
    Pending,
    Discovered,
    InProgress,
    Aborted,
    Done,
    Failed,
}

impl ScanState {
    /// Terminal scans are excluded from discovery and never reconciled again.
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanState::Done | ScanState::Failed)
    }
}

/// Machine-readable reason for the current scan status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatusReason {
    Created,
    AssetsDiscovered,
    NothingToScan,
    AssetScansRunning,
    Cancellation,
    Timeout,
    Error,
    Success,
}

/// Status of a Scan: state, reason, optional human-readable message, and the
/// time of the last state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanStatus {
    pub state: ScanState,
    pub reason: ScanStatusReason,
    pub message: Option<String>,
    pub last_transition_time: DateTime<Utc>,
}

impl ScanStatus {
    /// Creates a status stamped with the current time.
    pub fn new(state: ScanState, reason: ScanStatusReason, message: Option<String>) -> Self {
        ScanStatus {
            state,
            reason,
            message,
            last_transition_time: Utc::now(),
        }
    }
}

/// Which scanner families a scan runs against each asset.
///
/// Copied onto every AssetScan created for the scan so the scanner runner
/// knows what to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFamiliesConfig {
    pub sbom: bool,
    pub vulnerabilities: bool,
    pub secrets: bool,
    pub malware: bool,
    pub misconfigurations: bool,
    pub rootkits: bool,
    pub exploits: bool,
    pub info_finder: bool,
    pub plugins: bool,
}

impl Default for ScanFamiliesConfig {
    fn default() -> Self {
        ScanFamiliesConfig {
            sbom: true,
            vulnerabilities: true,
            secrets: true,
            malware: true,
            misconfigurations: true,
            rootkits: true,
            exploits: true,
            info_finder: true,
            plugins: true,
        }
    }
}

/// Asset selection scope for a Scan.
///
/// An empty scope matches every non-terminated asset. Label selectors must all
/// match; the location list, when non-empty, must contain the asset's
/// location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanScope {
    pub labels: BTreeMap<String, String>,
    pub locations: Vec<String>,
}

impl ScanScope {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.locations.is_empty()
    }

    /// Returns true if the asset falls within this scope. An empty scope
    /// matches everything.
    pub fn matches(&self, asset: &Asset) -> bool {
        let labels_match = self
            .labels
            .iter()
            .all(|(k, v)| asset.labels.get(k) == Some(v));

        let location_match = self.locations.is_empty()
            || asset
                .location
                .as_ref()
                .is_some_and(|loc| self.locations.contains(loc));

        labels_match && location_match
    }
}

/// Aggregate progress and finding totals for a Scan.
///
/// Always recomputed from scratch by folding every AssetScan's summary; never
/// incremented across reconciliations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub jobs_completed: u64,
    pub jobs_left_to_run: u64,
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

/// A persisted Scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    pub id: ScanId,

    /// Asset selection scope. `None` behaves like an empty scope.
    pub scope: Option<ScanScope>,

    /// Scanner families to run. Copied onto each AssetScan.
    pub families: ScanFamiliesConfig,

    /// Set exactly once at the Discovered transition; never shrinks.
    pub asset_ids: Option<Vec<AssetId>>,

    pub status: ScanStatus,
    pub summary: Option<ScanSummary>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Scan {
    /// Returns true if the scan has been running longer than `timeout`
    /// relative to its start time.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        let deadline = self.start_time
            + chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        Utc::now() > deadline
    }
}
