//! Extraction of finding payloads from asset-scan results.

use std::collections::HashSet;

use crate::types::{AssetScan, FindingCategory, FindingInfo};

/// Returns, for every finding category whose scanner family actually ran,
/// the findings it reported. Families whose results are `None` did not run
/// and must not be reconciled at all (reconciling them would invalidate
/// findings the scan never looked at).
pub fn extract_findings(asset_scan: &AssetScan) -> Vec<(FindingCategory, Vec<FindingInfo>)> {
    let results = &asset_scan.results;
    let mut extracted = Vec::new();

    if let Some(packages) = extract_packages(asset_scan) {
        extracted.push((FindingCategory::Package, packages));
    }
    if let Some(vulnerabilities) = &results.vulnerabilities {
        extracted.push((
            FindingCategory::Vulnerability,
            vulnerabilities
                .iter()
                .cloned()
                .map(FindingInfo::Vulnerability)
                .collect(),
        ));
    }
    if let Some(secrets) = &results.secrets {
        extracted.push((
            FindingCategory::Secret,
            secrets.iter().cloned().map(FindingInfo::Secret).collect(),
        ));
    }
    if let Some(malware) = &results.malware {
        extracted.push((
            FindingCategory::Malware,
            malware.iter().cloned().map(FindingInfo::Malware).collect(),
        ));
    }
    if let Some(misconfigurations) = &results.misconfigurations {
        extracted.push((
            FindingCategory::Misconfiguration,
            misconfigurations
                .iter()
                .cloned()
                .map(FindingInfo::Misconfiguration)
                .collect(),
        ));
    }
    if let Some(rootkits) = &results.rootkits {
        extracted.push((
            FindingCategory::Rootkit,
            rootkits.iter().cloned().map(FindingInfo::Rootkit).collect(),
        ));
    }
    if let Some(exploits) = &results.exploits {
        extracted.push((
            FindingCategory::Exploit,
            exploits.iter().cloned().map(FindingInfo::Exploit).collect(),
        ));
    }
    if let Some(info_finder) = &results.info_finder {
        extracted.push((
            FindingCategory::InfoFinder,
            info_finder
                .iter()
                .cloned()
                .map(FindingInfo::InfoFinder)
                .collect(),
        ));
    }
    if let Some(plugins) = &results.plugins {
        extracted.push((
            FindingCategory::Plugin,
            plugins.iter().cloned().map(FindingInfo::Plugin).collect(),
        ));
    }

    extracted
}

/// Package findings come from two sources: the SBOM family and the packages
/// embedded in vulnerability results. Deduped by finding key.
///
/// Returns `None` when neither family ran.
fn extract_packages(asset_scan: &AssetScan) -> Option<Vec<FindingInfo>> {
    let results = &asset_scan.results;
    if results.packages.is_none() && results.vulnerabilities.is_none() {
        return None;
    }

    let mut seen = HashSet::new();
    let mut packages = Vec::new();

    let from_sbom = results.packages.iter().flatten().cloned();
    let from_vulnerabilities = results
        .vulnerabilities
        .iter()
        .flatten()
        .map(|v| v.package.clone());

    for package in from_sbom.chain(from_vulnerabilities) {
        let info = FindingInfo::Package(package);
        if seen.insert(info.key()) {
            packages.push(info);
        }
    }

    Some(packages)
}
