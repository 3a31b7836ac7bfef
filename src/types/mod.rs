//! Entity types for the reconciliation core.

pub mod asset;
pub mod asset_scan;
pub mod finding;
pub mod finding_key;
pub mod ids;
pub mod scan;
pub mod severity;

pub use asset::{Asset, AssetSummary};
pub use asset_scan::{
    AssetScan, AssetScanResults, AssetScanState, AssetScanStatus, AssetScanStatusReason,
    AssetScanSummary,
};
pub use finding::{
    Exploit, Finding, FindingCategory, FindingInfo, FindingSummary, InfoFinder, Malware,
    Misconfiguration, Package, PluginFinding, Rootkit, Secret, Vulnerability,
};
pub use finding_key::FindingKey;
pub use ids::{AssetId, AssetScanId, FindingId, ScanId};
pub use scan::{
    Scan, ScanFamiliesConfig, ScanScope, ScanState, ScanStatus, ScanStatusReason, ScanSummary,
};
pub use severity::{Severity, VulnerabilitySeveritySummary};
