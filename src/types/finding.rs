//! The Finding entity and the tagged `FindingInfo` union.
//!
//! A finding is never hard-deleted: when a newer asset scan supersedes it,
//! `invalidated_on` is set instead, preserving history. At most one finding
//! per (category, asset, finding key) may be active at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AssetId, AssetScanId, FindingId};
use super::severity::{Severity, VulnerabilitySeveritySummary};

/// A software package, as reported by an SBOM or vulnerability scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub language: Option<String>,
    pub licenses: Vec<String>,
}

/// A vulnerability affecting a specific package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub vulnerability_name: String,
    pub severity: Severity,
    pub description: Option<String>,
    pub package: Package,
}

/// A leaked secret located by fingerprint and position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub fingerprint: String,
    pub description: String,
    pub file_path: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_column: u32,
}

/// Malware detected by a signature or rule match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Malware {
    pub malware_name: String,
    pub malware_type: String,
    pub rule_name: String,
    pub path: String,
}

/// A configuration check failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Misconfiguration {
    pub scanner_name: String,
    pub test_id: String,
    pub message: String,
    pub severity: Option<Severity>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub remediation: Option<String>,
}

/// A rootkit detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rootkit {
    pub rootkit_name: String,
    pub rootkit_type: String,
    pub message: String,
}

/// A known exploit matched against the asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exploit {
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub cve_id: String,
    pub source_db: String,
    pub urls: Vec<String>,
}

/// Informational data collected from the asset (e.g. SSH key fingerprints).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoFinder {
    pub scanner_name: String,
    pub info_type: String,
    pub data: String,
    pub path: String,
}

/// A finding reported by an external scanner plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginFinding {
    pub plugin_name: String,
    pub rule_id: String,
    pub message: String,
    pub severity: Option<Severity>,
}

/// Finding category discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FindingCategory {
    Package,
    Vulnerability,
    Secret,
    Malware,
    Misconfiguration,
    Rootkit,
    Exploit,
    InfoFinder,
    Plugin,
}

impl FindingCategory {
    pub const ALL: [FindingCategory; 9] = [
        FindingCategory::Package,
        FindingCategory::Vulnerability,
        FindingCategory::Secret,
        FindingCategory::Malware,
        FindingCategory::Misconfiguration,
        FindingCategory::Rootkit,
        FindingCategory::Exploit,
        FindingCategory::InfoFinder,
        FindingCategory::Plugin,
    ];
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FindingCategory::Package => "Package",
            FindingCategory::Vulnerability => "Vulnerability",
            FindingCategory::Secret => "Secret",
            FindingCategory::Malware => "Malware",
            FindingCategory::Misconfiguration => "Misconfiguration",
            FindingCategory::Rootkit => "Rootkit",
            FindingCategory::Exploit => "Exploit",
            FindingCategory::InfoFinder => "InfoFinder",
            FindingCategory::Plugin => "Plugin",
        };
        write!(f, "{s}")
    }
}

/// Category-specific payload of a finding.
///
/// Every consumption point matches exhaustively on this union; there is no
/// catch-all arm anywhere in the crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "objectType")]
pub enum FindingInfo {
    Package(Package),
    Vulnerability(Vulnerability),
    Secret(Secret),
    Malware(Malware),
    Misconfiguration(Misconfiguration),
    Rootkit(Rootkit),
    Exploit(Exploit),
    InfoFinder(InfoFinder),
    Plugin(PluginFinding),
}

impl FindingInfo {
    pub fn category(&self) -> FindingCategory {
        match self {
            FindingInfo::Package(_) => FindingCategory::Package,
            FindingInfo::Vulnerability(_) => FindingCategory::Vulnerability,
            FindingInfo::Secret(_) => FindingCategory::Secret,
            FindingInfo::Malware(_) => FindingCategory::Malware,
            FindingInfo::Misconfiguration(_) => FindingCategory::Misconfiguration,
            FindingInfo::Rootkit(_) => FindingCategory::Rootkit,
            FindingInfo::Exploit(_) => FindingCategory::Exploit,
            FindingInfo::InfoFinder(_) => FindingCategory::InfoFinder,
            FindingInfo::Plugin(_) => FindingCategory::Plugin,
        }
    }
}

/// Per-package vulnerability severity counts, recomputed by the finding
/// summary watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingSummary {
    pub updated_at: DateTime<Utc>,
    pub total_vulnerabilities: VulnerabilitySeveritySummary,
}

/// A persisted Finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: FindingId,
    pub asset_id: AssetId,

    /// The asset scan that first produced this finding.
    pub found_by: AssetScanId,

    /// Completion time of the asset scan that (most recently) confirmed this
    /// finding.
    pub found_on: DateTime<Utc>,

    /// Set when a newer asset scan supersedes this finding. Always >=
    /// `found_on`. Never cleared.
    pub invalidated_on: Option<DateTime<Utc>>,

    /// Completion time of the newest asset scan that observed this finding.
    pub last_seen: DateTime<Utc>,
    pub last_seen_by: AssetScanId,

    pub info: FindingInfo,
    pub summary: Option<FindingSummary>,
}

impl Finding {
    pub fn is_active(&self) -> bool {
        self.invalidated_on.is_none()
    }
}
