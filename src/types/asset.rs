//! The Asset entity and its derived finding summary.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::AssetId;
use super::severity::VulnerabilitySeveritySummary;

/// Counts of active (non-invalidated) findings per category for one asset.
///
/// Always recomputable from the active findings; owned by the asset-scan
/// processor which patches it after each reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetSummary {
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

/// A discovered cloud/VM/container asset.
///
/// Assets are created and terminated by the (out of scope) discovery layer;
/// the reconciliation core only reads them during scope matching and patches
/// their summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub labels: BTreeMap<String, String>,
    pub location: Option<String>,

    /// Set when the underlying resource no longer exists. Terminated assets
    /// are historic records and are never scanned.
    pub terminated_on: Option<DateTime<Utc>>,

    pub summary: AssetSummary,
}

impl Asset {
    pub fn is_terminated(&self) -> bool {
        self.terminated_on.is_some()
    }
}
