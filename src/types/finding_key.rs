//! Deterministic natural keys for findings.
//!
//! The finding key is derived from the category-specific attributes that make
//! a finding logically unique (package name+version, misconfiguration
//! scanner+test-id+message, ...). The store uses it to detect conflicts on
//! create, and the processor uses it for dedup and supersession.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::finding::FindingInfo;

/// A dot-joined natural key, unique per (category, asset).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FindingKey(String);

impl FindingKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FindingInfo {
    /// Computes the deterministic finding key for this payload.
    pub fn key(&self) -> FindingKey {
        let key = match self {
            FindingInfo::Package(p) => format!("{}.{}", p.name, p.version),
            FindingInfo::Vulnerability(v) => format!(
                "{}.{}.{}",
                v.vulnerability_name, v.package.name, v.package.version
            ),
            FindingInfo::Secret(s) => {
                format!("{}.{}.{}", s.fingerprint, s.start_column, s.end_column)
            }
            FindingInfo::Malware(m) => format!(
                "{}.{}.{}.{}",
                m.malware_name, m.malware_type, m.rule_name, m.path
            ),
            FindingInfo::Misconfiguration(m) => {
                format!("{}.{}.{}", m.scanner_name, m.test_id, m.message)
            }
            FindingInfo::Rootkit(r) => {
                format!("{}.{}.{}", r.rootkit_name, r.rootkit_type, r.message)
            }
            FindingInfo::Exploit(e) => format!(
                "{}.{}.{}.{}.{}",
                e.cve_id,
                e.name,
                e.source_db,
                e.title,
                e.urls.join(".")
            ),
            FindingInfo::InfoFinder(i) => format!(
                "{}.{}.{}.{}",
                i.scanner_name, i.info_type, i.data, i.path
            ),
            FindingInfo::Plugin(p) => format!("{}.{}.{}", p.plugin_name, p.rule_id, p.message),
        };
        FindingKey(key)
    }
}
