//! Abstract storage client for Scan/AssetScan/Finding/Asset entities.
//!
//! The reconciliation core is the sole consumer of this trait. The real
//! implementation (REST + OData encoding, optimistic revision checks) lives in
//! the excluded API layer; here queries are expressed as typed structs that an
//! implementation interprets however it likes.
//!
//! Conflict-on-create is surfaced as a typed error carrying the conflicting
//! object, because the state machines treat conflicts as control flow rather
//! than failures.

pub mod memory;

use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{
    Asset, AssetId, AssetScan, AssetScanId, AssetScanState, AssetScanStatus, AssetSummary,
    Finding, FindingCategory, FindingId, FindingInfo, FindingSummary, Scan, ScanId, ScanScope,
    ScanState, ScanStatus, ScanSummary, Severity,
};

/// Partial update of a Scan. Unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ScanPatch {
    pub status: Option<ScanStatus>,
    pub summary: Option<ScanSummary>,
    pub asset_ids: Option<Vec<AssetId>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Partial update of an AssetScan.
#[derive(Debug, Clone, Default)]
pub struct AssetScanPatch {
    pub status: Option<AssetScanStatus>,
    pub findings_processed: Option<bool>,
}

/// Partial update of a Finding.
#[derive(Debug, Clone, Default)]
pub struct FindingPatch {
    pub found_on: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_seen_by: Option<AssetScanId>,
    pub invalidated_on: Option<DateTime<Utc>>,
    pub info: Option<FindingInfo>,
    pub summary: Option<FindingSummary>,
}

/// Partial update of an Asset.
#[derive(Debug, Clone, Default)]
pub struct AssetPatch {
    pub summary: Option<AssetSummary>,
}

/// Errors surfaced by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An AssetScan already exists for this (Scan, Asset) pair. Carries the
    /// existing record so callers can treat the conflict as success.
    #[error("asset scan already exists for scan {} and asset {}", .0.scan_id, .0.asset_id)]
    AssetScanExists(Box<AssetScan>),

    /// An active Finding with the same (asset, finding key) already exists.
    /// Carries the existing record so callers can compare timestamps.
    #[error("finding already exists for asset {} with key {}", .0.asset_id, .0.info.key())]
    FindingExists(Box<Finding>),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Transient failure (network, 5xx, storage unavailable). Reconciliation
    /// aborts for this cycle and the entity is re-discovered next poll.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// One page of query results.
///
/// `count` is the total number of matching records before paging, so
/// count-only queries can request zero items and still learn the total.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub count: usize,
}

/// Paging and count-only controls shared by every list query.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageRequest {
    pub top: Option<usize>,
    pub skip: Option<usize>,

    /// When set, implementations may return an empty `items` vector; only
    /// `count` is meaningful. Minimises transfer for count queries.
    pub count_only: bool,
}

impl PageRequest {
    pub fn count_only() -> Self {
        PageRequest {
            top: Some(0),
            skip: None,
            count_only: true,
        }
    }
}

/// Filter for listing Scans.
#[derive(Debug, Clone, Default)]
pub struct ScanQuery {
    /// Exclude scans in any of these states.
    pub exclude_states: Vec<ScanState>,
    pub page: PageRequest,
}

/// Filter for listing Assets.
#[derive(Debug, Clone, Default)]
pub struct AssetQuery {
    /// Only assets whose `terminated_on` is unset.
    pub not_terminated: bool,

    /// Scope filter, ANDed with `not_terminated` when non-empty.
    pub scope: Option<ScanScope>,
    pub page: PageRequest,
}

/// Filter for listing AssetScans.
#[derive(Debug, Clone, Default)]
pub struct AssetScanQuery {
    pub scan_id: Option<ScanId>,
    /// Exclude asset scans in any of these states.
    pub exclude_states: Vec<AssetScanState>,
    pub page: PageRequest,
}

/// Filter for listing Findings. All set fields are ANDed.
#[derive(Debug, Clone, Default)]
pub struct FindingQuery {
    pub category: Option<FindingCategory>,
    pub asset_id: Option<AssetId>,

    /// Only findings with `invalidated_on == None`.
    pub active_only: bool,

    /// Only findings with `found_on` strictly before this time.
    pub found_before: Option<DateTime<Utc>>,

    /// Only findings with `found_on` strictly after this time.
    pub found_after: Option<DateTime<Utc>>,

    /// Only findings whose `invalidated_on` is unset or strictly after this
    /// time. Used to skip findings already invalidated by an older scan.
    pub invalidated_after_or_null: Option<DateTime<Utc>>,

    /// Only findings whose summary is missing or was updated before this
    /// time. Used by the finding summary watcher.
    pub summary_stale_before: Option<DateTime<Utc>>,

    /// Only Vulnerability findings affecting this (package name, version).
    pub package: Option<(String, String)>,

    /// Only Vulnerability findings of this severity.
    pub severity: Option<Severity>,

    pub page: PageRequest,
}

/// CRUD client over the external entity store.
///
/// All methods return `Send` futures so they can be driven from the worker
/// pool. Implementations must be cheap to share behind an `Arc`.
pub trait Store: Send + Sync + 'static {
    fn list_scans(&self, query: ScanQuery)
    -> impl Future<Output = Result<Page<Scan>, StoreError>> + Send;

    fn get_scan(&self, id: &ScanId) -> impl Future<Output = Result<Scan, StoreError>> + Send;

    fn patch_scan(
        &self,
        id: &ScanId,
        patch: ScanPatch,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Creates an AssetScan. Fails with [`StoreError::AssetScanExists`] when
    /// one already exists for the same (Scan, Asset) pair.
    fn create_asset_scan(
        &self,
        asset_scan: AssetScan,
    ) -> impl Future<Output = Result<AssetScan, StoreError>> + Send;

    fn get_asset_scan(
        &self,
        id: &AssetScanId,
    ) -> impl Future<Output = Result<AssetScan, StoreError>> + Send;

    fn list_asset_scans(
        &self,
        query: AssetScanQuery,
    ) -> impl Future<Output = Result<Page<AssetScan>, StoreError>> + Send;

    fn patch_asset_scan(
        &self,
        id: &AssetScanId,
        patch: AssetScanPatch,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Creates a Finding. Fails with [`StoreError::FindingExists`] when an
    /// active finding with the same (asset, finding key) already exists.
    fn create_finding(
        &self,
        finding: Finding,
    ) -> impl Future<Output = Result<Finding, StoreError>> + Send;

    fn get_finding(
        &self,
        id: &FindingId,
    ) -> impl Future<Output = Result<Finding, StoreError>> + Send;

    fn list_findings(
        &self,
        query: FindingQuery,
    ) -> impl Future<Output = Result<Page<Finding>, StoreError>> + Send;

    fn patch_finding(
        &self,
        id: &FindingId,
        patch: FindingPatch,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn list_assets(
        &self,
        query: AssetQuery,
    ) -> impl Future<Output = Result<Page<Asset>, StoreError>> + Send;

    fn get_asset(&self, id: &AssetId) -> impl Future<Output = Result<Asset, StoreError>> + Send;

    fn patch_asset(
        &self,
        id: &AssetId,
        patch: AssetPatch,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
