use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::store::memory::InMemoryStore;
use crate::store::{FindingQuery, Store};
use crate::types::{
    Asset, AssetId, AssetScan, AssetScanId, AssetScanResults, AssetScanState, AssetScanStatus,
    AssetScanStatusReason, AssetScanSummary, FindingCategory, Misconfiguration, Package,
    ScanFamiliesConfig, ScanId, Severity, Vulnerability,
};

use super::{AssetScanProcessor, ProcessorError};

fn pkg(name: &str, version: &str) -> Package {
    Package {
        name: name.into(),
        version: version.into(),
        language: None,
        licenses: vec![],
    }
}

fn vuln(name: &str, severity: Severity, package: Package) -> Vulnerability {
    Vulnerability {
        vulnerability_name: name.into(),
        severity,
        description: None,
        package,
    }
}

fn misconfig(test_id: &str) -> Misconfiguration {
    Misconfiguration {
        scanner_name: "cisdocker".into(),
        test_id: test_id.into(),
        message: "check failed".into(),
        severity: None,
        category: None,
        description: None,
        location: None,
        remediation: None,
    }
}

fn done_asset_scan(
    id: &str,
    asset: &str,
    completed: DateTime<Utc>,
    results: AssetScanResults,
) -> AssetScan {
    let mut status =
        AssetScanStatus::new(AssetScanState::Done, AssetScanStatusReason::Success, None);
    status.last_transition_time = completed;
    AssetScan {
        id: AssetScanId::new(id),
        scan_id: ScanId::new("s1"),
        asset_id: AssetId::new(asset),
        families: ScanFamiliesConfig::default(),
        status,
        summary: AssetScanSummary::default(),
        results,
        findings_processed: false,
    }
}

fn seed(store: &InMemoryStore, asset_scan: AssetScan) {
    store.insert_asset(Asset {
        id: asset_scan.asset_id.clone(),
        labels: Default::default(),
        location: None,
        terminated_on: None,
        summary: Default::default(),
    });
    store.insert_asset_scan(asset_scan);
}

async fn active_findings(
    store: &InMemoryStore,
    asset: &str,
    category: FindingCategory,
) -> Vec<crate::types::Finding> {
    store
        .list_findings(FindingQuery {
            category: Some(category),
            asset_id: Some(AssetId::new(asset)),
            active_only: true,
            ..Default::default()
        })
        .await
        .unwrap()
        .items
}

#[tokio::test]
async fn processing_a_running_asset_scan_is_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let mut asset_scan = done_asset_scan("as1", "a1", Utc::now(), Default::default());
    asset_scan.status.state = AssetScanState::InProgress;
    seed(&store, asset_scan);

    let processor = AssetScanProcessor::new(store.clone());
    let err = processor.process(&AssetScanId::new("as1")).await.unwrap_err();
    assert!(matches!(err, ProcessorError::NotCompleted(_)));
}

#[tokio::test]
async fn creates_findings_and_is_idempotent_on_reprocessing() {
    let store = Arc::new(InMemoryStore::new());
    let completed = Utc::now();
    let results = AssetScanResults {
        packages: Some(vec![pkg("curl", "7.74.0"), pkg("zlib", "1.2.11")]),
        ..Default::default()
    };
    seed(&store, done_asset_scan("as1", "a1", completed, results));

    let processor = AssetScanProcessor::new(store.clone());
    processor.process(&AssetScanId::new("as1")).await.unwrap();
    // Re-run, as after a crash before findings_processed was set.
    processor.process(&AssetScanId::new("as1")).await.unwrap();

    let findings = active_findings(&store, "a1", FindingCategory::Package).await;
    assert_eq!(findings.len(), 2);
    for finding in &findings {
        assert_eq!(finding.found_on, completed);
        assert_eq!(finding.last_seen, completed);
        assert_eq!(finding.found_by, AssetScanId::new("as1"));
    }

    let asset = store.get_asset(&AssetId::new("a1")).await.unwrap();
    assert_eq!(asset.summary.total_packages, 2);
}

#[tokio::test]
async fn newer_scan_refreshes_surviving_findings_and_invalidates_the_rest() {
    let store = Arc::new(InMemoryStore::new());
    let first = Utc::now() - Duration::hours(2);
    let second = Utc::now();

    seed(
        &store,
        done_asset_scan(
            "as1",
            "a1",
            first,
            AssetScanResults {
                packages: Some(vec![pkg("curl", "7.74.0"), pkg("zlib", "1.2.11")]),
                ..Default::default()
            },
        ),
    );
    let processor = AssetScanProcessor::new(store.clone());
    processor.process(&AssetScanId::new("as1")).await.unwrap();

    // Second scan still sees curl but zlib is gone.
    store.insert_asset_scan(done_asset_scan(
        "as2",
        "a1",
        second,
        AssetScanResults {
            packages: Some(vec![pkg("curl", "7.74.0")]),
            ..Default::default()
        },
    ));
    processor.process(&AssetScanId::new("as2")).await.unwrap();

    let active = active_findings(&store, "a1", FindingCategory::Package).await;
    assert_eq!(active.len(), 1);
    let curl = &active[0];
    assert_eq!(curl.info.key().as_str(), "curl.7.74.0");
    // Last writer wins: the surviving finding was refreshed, not recreated.
    assert_eq!(curl.found_by, AssetScanId::new("as1"));
    assert_eq!(curl.last_seen_by, AssetScanId::new("as2"));
    assert_eq!(curl.last_seen, second);

    // zlib was superseded, not deleted, and invalidation never precedes
    // discovery.
    let all = store
        .list_findings(FindingQuery {
            category: Some(FindingCategory::Package),
            asset_id: Some(AssetId::new("a1")),
            ..Default::default()
        })
        .await
        .unwrap()
        .items;
    assert_eq!(all.len(), 2);
    let zlib = all
        .iter()
        .find(|f| f.info.key().as_str() == "zlib.1.2.11")
        .unwrap();
    assert_eq!(zlib.invalidated_on, Some(second));
    assert!(zlib.invalidated_on.unwrap() >= zlib.found_on);

    let asset = store.get_asset(&AssetId::new("a1")).await.unwrap();
    assert_eq!(asset.summary.total_packages, 1);
}

#[tokio::test]
async fn older_scan_processed_late_does_not_downgrade_newer_findings() {
    let store = Arc::new(InMemoryStore::new());
    let older = Utc::now() - Duration::hours(2);
    let newer = Utc::now();

    seed(
        &store,
        done_asset_scan(
            "as-new",
            "a1",
            newer,
            AssetScanResults {
                packages: Some(vec![pkg("curl", "7.74.0")]),
                ..Default::default()
            },
        ),
    );
    let processor = AssetScanProcessor::new(store.clone());
    processor.process(&AssetScanId::new("as-new")).await.unwrap();

    store.insert_asset_scan(done_asset_scan(
        "as-old",
        "a1",
        older,
        AssetScanResults {
            packages: Some(vec![pkg("curl", "7.74.0")]),
            ..Default::default()
        },
    ));
    processor.process(&AssetScanId::new("as-old")).await.unwrap();

    let active = active_findings(&store, "a1", FindingCategory::Package).await;
    assert_eq!(active.len(), 1);
    // The conflict was resolved in favour of the newer scan.
    assert_eq!(active[0].last_seen, newer);
    assert_eq!(active[0].last_seen_by, AssetScanId::new("as-new"));
}

#[tokio::test]
async fn misconfigurations_from_late_scan_are_created_pre_invalidated() {
    let store = Arc::new(InMemoryStore::new());
    let older = Utc::now() - Duration::hours(2);
    let newer = Utc::now();

    // Newer scan already processed: one misconfiguration on record.
    seed(
        &store,
        done_asset_scan(
            "as-new",
            "a1",
            newer,
            AssetScanResults {
                misconfigurations: Some(vec![misconfig("CIS-1.1")]),
                ..Default::default()
            },
        ),
    );
    let processor = AssetScanProcessor::new(store.clone());
    processor.process(&AssetScanId::new("as-new")).await.unwrap();

    // An older scan arrives late with a misconfiguration the newer scan no
    // longer reports.
    store.insert_asset_scan(done_asset_scan(
        "as-old",
        "a1",
        older,
        AssetScanResults {
            misconfigurations: Some(vec![misconfig("CIS-9.9")]),
            ..Default::default()
        },
    ));
    processor.process(&AssetScanId::new("as-old")).await.unwrap();

    // The stale misconfiguration exists for history but was never active.
    let all = store
        .list_findings(FindingQuery {
            category: Some(FindingCategory::Misconfiguration),
            asset_id: Some(AssetId::new("a1")),
            ..Default::default()
        })
        .await
        .unwrap()
        .items;
    let stale = all
        .iter()
        .find(|f| f.info.key().as_str().contains("CIS-9.9"))
        .unwrap();
    assert_eq!(stale.invalidated_on, Some(newer));

    let active = active_findings(&store, "a1", FindingCategory::Misconfiguration).await;
    assert_eq!(active.len(), 1);
    assert!(active[0].info.key().as_str().contains("CIS-1.1"));

    let asset = store.get_asset(&AssetId::new("a1")).await.unwrap();
    assert_eq!(asset.summary.total_misconfigurations, 1);
}

#[tokio::test]
async fn misconfiguration_absent_from_newer_scan_is_invalidated_at_its_time() {
    let store = Arc::new(InMemoryStore::new());
    let t10 = Utc::now() - Duration::hours(2);
    let t20 = Utc::now();

    seed(
        &store,
        done_asset_scan(
            "as1",
            "a1",
            t10,
            AssetScanResults {
                misconfigurations: Some(vec![misconfig("CIS-1.1")]),
                ..Default::default()
            },
        ),
    );
    let processor = AssetScanProcessor::new(store.clone());
    processor.process(&AssetScanId::new("as1")).await.unwrap();

    // The newer scan ran the family but no longer reports the check.
    store.insert_asset_scan(done_asset_scan(
        "as2",
        "a1",
        t20,
        AssetScanResults {
            misconfigurations: Some(vec![]),
            ..Default::default()
        },
    ));
    processor.process(&AssetScanId::new("as2")).await.unwrap();

    let all = store
        .list_findings(FindingQuery {
            category: Some(FindingCategory::Misconfiguration),
            asset_id: Some(AssetId::new("a1")),
            ..Default::default()
        })
        .await
        .unwrap()
        .items;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].invalidated_on, Some(t20));

    let asset = store.get_asset(&AssetId::new("a1")).await.unwrap();
    assert_eq!(asset.summary.total_misconfigurations, 0);
}

#[tokio::test]
async fn at_most_one_active_finding_per_key() {
    let store = Arc::new(InMemoryStore::new());
    let processor = AssetScanProcessor::new(store.clone());

    let mut when = Utc::now() - Duration::hours(3);
    seed(
        &store,
        done_asset_scan(
            "as0",
            "a1",
            when,
            AssetScanResults {
                packages: Some(vec![pkg("curl", "7.74.0")]),
                ..Default::default()
            },
        ),
    );
    processor.process(&AssetScanId::new("as0")).await.unwrap();

    // Three more scans, each an hour apart, all reporting the same package.
    for i in 1..4 {
        when += Duration::hours(1);
        store.insert_asset_scan(done_asset_scan(
            &format!("as{i}"),
            "a1",
            when,
            AssetScanResults {
                packages: Some(vec![pkg("curl", "7.74.0")]),
                ..Default::default()
            },
        ));
        processor
            .process(&AssetScanId::new(format!("as{i}")))
            .await
            .unwrap();
    }

    let active = active_findings(&store, "a1", FindingCategory::Package).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].last_seen, when);
}

#[tokio::test]
async fn vulnerability_counts_are_recorded_per_severity() {
    let store = Arc::new(InMemoryStore::new());
    let results = AssetScanResults {
        vulnerabilities: Some(vec![
            vuln("CVE-1", Severity::Critical, pkg("openssl", "1.1.1")),
            vuln("CVE-2", Severity::High, pkg("openssl", "1.1.1")),
            vuln("CVE-3", Severity::High, pkg("curl", "7.74.0")),
            vuln("CVE-4", Severity::Negligible, pkg("zlib", "1.2.11")),
        ]),
        ..Default::default()
    };
    seed(&store, done_asset_scan("as1", "a1", Utc::now(), results));

    let processor = AssetScanProcessor::new(store.clone());
    processor.process(&AssetScanId::new("as1")).await.unwrap();

    let asset = store.get_asset(&AssetId::new("a1")).await.unwrap();
    let totals = &asset.summary.total_vulnerabilities;
    assert_eq!(totals.get(Severity::Critical), 1);
    assert_eq!(totals.get(Severity::High), 2);
    assert_eq!(totals.get(Severity::Medium), 0);
    assert_eq!(totals.get(Severity::Negligible), 1);
    assert_eq!(totals.total(), 4);

    // Vulnerability scans also register the packages they inspected.
    assert_eq!(asset.summary.total_packages, 3);
}

#[tokio::test]
async fn families_that_did_not_run_leave_findings_untouched() {
    let store = Arc::new(InMemoryStore::new());
    let first = Utc::now() - Duration::hours(1);
    seed(
        &store,
        done_asset_scan(
            "as1",
            "a1",
            first,
            AssetScanResults {
                packages: Some(vec![pkg("curl", "7.74.0")]),
                misconfigurations: Some(vec![misconfig("CIS-1.1")]),
                ..Default::default()
            },
        ),
    );
    let processor = AssetScanProcessor::new(store.clone());
    processor.process(&AssetScanId::new("as1")).await.unwrap();

    // A later scan that only ran the misconfiguration family must not
    // invalidate package findings it never looked at.
    store.insert_asset_scan(done_asset_scan(
        "as2",
        "a1",
        Utc::now(),
        AssetScanResults {
            misconfigurations: Some(vec![]),
            ..Default::default()
        },
    ));
    processor.process(&AssetScanId::new("as2")).await.unwrap();

    let packages = active_findings(&store, "a1", FindingCategory::Package).await;
    assert_eq!(packages.len(), 1);

    let misconfigs = active_findings(&store, "a1", FindingCategory::Misconfiguration).await;
    assert!(misconfigs.is_empty());
}
