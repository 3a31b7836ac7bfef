//! In-memory store implementation.
//!
//! Backs the test suite and the dry-run mode of the binary. Behaves like the
//! real storage layer at the seam the core cares about: typed conflicts on
//! create, filterable list queries, and partial patches.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::types::{
    Asset, AssetId, AssetScan, AssetScanId, Finding, FindingId, FindingInfo, Scan, ScanId,
};

use super::{
    AssetPatch, AssetQuery, AssetScanPatch, AssetScanQuery, FindingPatch, FindingQuery, Page,
    PageRequest, ScanPatch, ScanQuery, Store, StoreError,
};

#[derive(Default)]
struct State {
    scans: BTreeMap<ScanId, Scan>,
    asset_scans: BTreeMap<AssetScanId, AssetScan>,
    findings: BTreeMap<FindingId, Finding>,
    assets: BTreeMap<AssetId, Asset>,
    next_id: u64,
}

impl State {
    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// Thread-safe in-process store.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<State>,
}

fn paginate<T>(mut items: Vec<T>, page: PageRequest) -> Page<T> {
    let count = items.len();
    if let Some(skip) = page.skip {
        items = items.into_iter().skip(skip).collect();
    }
    if let Some(top) = page.top {
        items.truncate(top);
    }
    if page.count_only {
        items.clear();
    }
    Page { items, count }
}

fn finding_matches(finding: &Finding, query: &FindingQuery) -> bool {
    if let Some(category) = query.category
        && finding.info.category() != category
    {
        return false;
    }
    if let Some(asset_id) = &query.asset_id
        && &finding.asset_id != asset_id
    {
        return false;
    }
    if query.active_only && finding.invalidated_on.is_some() {
        return false;
    }
    if let Some(before) = query.found_before
        && finding.found_on >= before
    {
        return false;
    }
    if let Some(after) = query.found_after
        && finding.found_on <= after
    {
        return false;
    }
    if let Some(cutoff) = query.invalidated_after_or_null
        && let Some(invalidated) = finding.invalidated_on
        && invalidated <= cutoff
    {
        return false;
    }
    if let Some(stale) = query.summary_stale_before {
        match &finding.summary {
            Some(summary) if summary.updated_at >= stale => return false,
            _ => {}
        }
    }
    if let Some((name, version)) = &query.package {
        match &finding.info {
            FindingInfo::Vulnerability(v) => {
                if &v.package.name != name || &v.package.version != version {
                    return false;
                }
            }
            _ => return false,
        }
    }
    if let Some(severity) = query.severity {
        match &finding.info {
            FindingInfo::Vulnerability(v) => {
                if v.severity != severity {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a scan directly, bypassing lifecycle rules. Test/seed helper.
    pub fn insert_scan(&self, scan: Scan) {
        let mut state = self.inner.lock().unwrap();
        state.scans.insert(scan.id.clone(), scan);
    }

    /// Inserts an asset directly. Test/seed helper.
    pub fn insert_asset(&self, asset: Asset) {
        let mut state = self.inner.lock().unwrap();
        state.assets.insert(asset.id.clone(), asset);
    }

    /// Inserts an asset scan directly, bypassing conflict checks. Test/seed
    /// helper.
    pub fn insert_asset_scan(&self, asset_scan: AssetScan) {
        let mut state = self.inner.lock().unwrap();
        state.asset_scans.insert(asset_scan.id.clone(), asset_scan);
    }

    /// Inserts a finding directly, bypassing conflict checks. Test/seed
    /// helper.
    pub fn insert_finding(&self, finding: Finding) {
        let mut state = self.inner.lock().unwrap();
        state.findings.insert(finding.id.clone(), finding);
    }
}

impl Store for InMemoryStore {
    async fn list_scans(&self, query: ScanQuery) -> Result<Page<Scan>, StoreError> {
        let state = self.inner.lock().unwrap();
        let items: Vec<Scan> = state
            .scans
            .values()
            .filter(|s| !query.exclude_states.contains(&s.status.state))
            .cloned()
            .collect();
        Ok(paginate(items, query.page))
    }

    async fn get_scan(&self, id: &ScanId) -> Result<Scan, StoreError> {
        let state = self.inner.lock().unwrap();
        state
            .scans
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Scan", id))
    }

    async fn patch_scan(&self, id: &ScanId, patch: ScanPatch) -> Result<(), StoreError> {
        let mut state = self.inner.lock().unwrap();
        let scan = state
            .scans
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("Scan", id))?;
        if let Some(status) = patch.status {
            scan.status = status;
        }
        if let Some(summary) = patch.summary {
            scan.summary = Some(summary);
        }
        if let Some(asset_ids) = patch.asset_ids {
            scan.asset_ids = Some(asset_ids);
        }
        if let Some(end_time) = patch.end_time {
            scan.end_time = Some(end_time);
        }
        Ok(())
    }

    async fn create_asset_scan(&self, mut asset_scan: AssetScan) -> Result<AssetScan, StoreError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(existing) = state
            .asset_scans
            .values()
            .find(|a| a.scan_id == asset_scan.scan_id && a.asset_id == asset_scan.asset_id)
        {
            return Err(StoreError::AssetScanExists(Box::new(existing.clone())));
        }
        if asset_scan.id.as_str().is_empty() {
            asset_scan.id = AssetScanId::new(state.fresh_id("assetscan"));
        }
        state
            .asset_scans
            .insert(asset_scan.id.clone(), asset_scan.clone());
        Ok(asset_scan)
    }

    async fn get_asset_scan(&self, id: &AssetScanId) -> Result<AssetScan, StoreError> {
        let state = self.inner.lock().unwrap();
        state
            .asset_scans
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("AssetScan", id))
    }

    async fn list_asset_scans(
        &self,
        query: AssetScanQuery,
    ) -> Result<Page<AssetScan>, StoreError> {
        let state = self.inner.lock().unwrap();
        let items: Vec<AssetScan> = state
            .asset_scans
            .values()
            .filter(|a| {
                query
                    .scan_id
                    .as_ref()
                    .is_none_or(|scan_id| &a.scan_id == scan_id)
                    && !query.exclude_states.contains(&a.status.state)
            })
            .cloned()
            .collect();
        Ok(paginate(items, query.page))
    }

    async fn patch_asset_scan(
        &self,
        id: &AssetScanId,
        patch: AssetScanPatch,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.lock().unwrap();
        let asset_scan = state
            .asset_scans
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("AssetScan", id))?;
        if let Some(status) = patch.status {
            asset_scan.status = status;
        }
        if let Some(processed) = patch.findings_processed {
            asset_scan.findings_processed = processed;
        }
        Ok(())
    }

    async fn create_finding(&self, mut finding: Finding) -> Result<Finding, StoreError> {
        let mut state = self.inner.lock().unwrap();
        let key = finding.info.key();
        if let Some(existing) = state.findings.values().find(|f| {
            f.asset_id == finding.asset_id
                && f.invalidated_on.is_none()
                && f.info.category() == finding.info.category()
                && f.info.key() == key
        }) {
            return Err(StoreError::FindingExists(Box::new(existing.clone())));
        }
        if finding.id.as_str().is_empty() {
            finding.id = FindingId::new(state.fresh_id("finding"));
        }
        state.findings.insert(finding.id.clone(), finding.clone());
        Ok(finding)
    }

    async fn get_finding(&self, id: &FindingId) -> Result<Finding, StoreError> {
        let state = self.inner.lock().unwrap();
        state
            .findings
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Finding", id))
    }

    async fn list_findings(&self, query: FindingQuery) -> Result<Page<Finding>, StoreError> {
        let state = self.inner.lock().unwrap();
        let items: Vec<Finding> = state
            .findings
            .values()
            .filter(|f| finding_matches(f, &query))
            .cloned()
            .collect();
        Ok(paginate(items, query.page))
    }

    async fn patch_finding(&self, id: &FindingId, patch: FindingPatch) -> Result<(), StoreError> {
        let mut state = self.inner.lock().unwrap();
        let finding = state
            .findings
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("Finding", id))?;
        if let Some(found_on) = patch.found_on {
            finding.found_on = found_on;
        }
        if let Some(last_seen) = patch.last_seen {
            finding.last_seen = last_seen;
        }
        if let Some(last_seen_by) = patch.last_seen_by {
            finding.last_seen_by = last_seen_by;
        }
        if let Some(invalidated_on) = patch.invalidated_on {
            finding.invalidated_on = Some(invalidated_on);
        }
        if let Some(info) = patch.info {
            finding.info = info;
        }
        if let Some(summary) = patch.summary {
            finding.summary = Some(summary);
        }
        Ok(())
    }

    async fn list_assets(&self, query: AssetQuery) -> Result<Page<Asset>, StoreError> {
        let state = self.inner.lock().unwrap();
        let items: Vec<Asset> = state
            .assets
            .values()
            .filter(|a| {
                if query.not_terminated && a.is_terminated() {
                    return false;
                }
                match &query.scope {
                    Some(scope) => scope.matches(a),
                    None => true,
                }
            })
            .cloned()
            .collect();
        Ok(paginate(items, query.page))
    }

    async fn get_asset(&self, id: &AssetId) -> Result<Asset, StoreError> {
        let state = self.inner.lock().unwrap();
        state
            .assets
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Asset", id))
    }

    async fn patch_asset(&self, id: &AssetId, patch: AssetPatch) -> Result<(), StoreError> {
        let mut state = self.inner.lock().unwrap();
        let asset = state
            .assets
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("Asset", id))?;
        if let Some(summary) = patch.summary {
            asset.summary = summary;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AssetScanStatus, AssetScanState, AssetScanStatusReason, Package, ScanFamiliesConfig,
        ScanStatus, ScanState, ScanStatusReason,
    };
    use chrono::Utc;

    fn scan(id: &str, state: ScanState) -> Scan {
        Scan {
            id: ScanId::new(id),
            scope: None,
            families: ScanFamiliesConfig::default(),
            asset_ids: None,
            status: ScanStatus::new(state, ScanStatusReason::Created, None),
            summary: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    fn package_finding(id: &str, asset: &str, name: &str, version: &str) -> Finding {
        Finding {
            id: FindingId::new(id),
            asset_id: AssetId::new(asset),
            found_by: AssetScanId::new("as-1"),
            found_on: Utc::now(),
            invalidated_on: None,
            last_seen: Utc::now(),
            last_seen_by: AssetScanId::new("as-1"),
            info: FindingInfo::Package(Package {
                name: name.into(),
                version: version.into(),
                language: None,
                licenses: vec![],
            }),
            summary: None,
        }
    }

    #[tokio::test]
    async fn list_scans_excludes_states() {
        let store = InMemoryStore::new();
        store.insert_scan(scan("s1", ScanState::Pending));
        store.insert_scan(scan("s2", ScanState::Done));
        store.insert_scan(scan("s3", ScanState::Failed));

        let page = store
            .list_scans(ScanQuery {
                exclude_states: vec![ScanState::Done, ScanState::Failed],
                page: PageRequest::default(),
            })
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.items[0].id.as_str(), "s1");
    }

    #[tokio::test]
    async fn create_asset_scan_conflicts_on_scan_asset_pair() {
        let store = InMemoryStore::new();
        let s = scan("s1", ScanState::Discovered);
        let first = AssetScan::new_for_asset(&s, AssetId::new("a1"));
        let created = store.create_asset_scan(first.clone()).await.unwrap();
        assert!(!created.id.as_str().is_empty());

        let err = store.create_asset_scan(first).await.unwrap_err();
        match err {
            StoreError::AssetScanExists(existing) => assert_eq!(existing.id, created.id),
            other => panic!("expected conflict, got {other:?}"),
        }

        // A different asset for the same scan is fine.
        store
            .create_asset_scan(AssetScan::new_for_asset(&s, AssetId::new("a2")))
            .await
            .unwrap();

        let mut status = AssetScanStatus::new(
            AssetScanState::Done,
            AssetScanStatusReason::Success,
            None,
        );
        status.last_transition_time = Utc::now();
        store
            .patch_asset_scan(
                &created.id,
                AssetScanPatch {
                    status: Some(status),
                    findings_processed: Some(true),
                },
            )
            .await
            .unwrap();
        let fetched = store.get_asset_scan(&created.id).await.unwrap();
        assert_eq!(fetched.status.state, AssetScanState::Done);
        assert!(fetched.findings_processed);
    }

    #[tokio::test]
    async fn create_finding_conflicts_only_against_active_same_key() {
        let store = InMemoryStore::new();
        let active = package_finding("f1", "a1", "curl", "7.74.0");
        store.insert_finding(active.clone());

        // Same key, same asset: conflict carrying the existing record.
        let dup = package_finding("", "a1", "curl", "7.74.0");
        match store.create_finding(dup).await.unwrap_err() {
            StoreError::FindingExists(existing) => assert_eq!(existing.id, active.id),
            other => panic!("expected conflict, got {other:?}"),
        }

        // Different asset: no conflict.
        store
            .create_finding(package_finding("", "a2", "curl", "7.74.0"))
            .await
            .unwrap();

        // Invalidated records do not block creation.
        let mut invalidated = package_finding("f3", "a3", "curl", "7.74.0");
        invalidated.invalidated_on = Some(Utc::now());
        store.insert_finding(invalidated);
        store
            .create_finding(package_finding("", "a3", "curl", "7.74.0"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn count_only_returns_count_without_items() {
        let store = InMemoryStore::new();
        store.insert_finding(package_finding("f1", "a1", "curl", "7.74.0"));
        store.insert_finding(package_finding("f2", "a1", "zlib", "1.2.11"));

        let page = store
            .list_findings(FindingQuery {
                asset_id: Some(AssetId::new("a1")),
                page: PageRequest::count_only(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.count, 2);
        assert!(page.items.is_empty());
    }
}
