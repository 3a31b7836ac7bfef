//! Vulnerability severity levels and per-severity count summaries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a vulnerability finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Negligible,
}

impl Severity {
    /// All severities, ordered from most to least severe.
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Negligible,
    ];
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
            Severity::Negligible => "Negligible",
        };
        write!(f, "{s}")
    }
}

/// Vulnerability counts broken down by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilitySeveritySummary {
    pub total_critical: u64,
    pub total_high: u64,
    pub total_medium: u64,
    pub total_low: u64,
    pub total_negligible: u64,
}

impl VulnerabilitySeveritySummary {
    pub fn get(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Critical => self.total_critical,
            Severity::High => self.total_high,
            Severity::Medium => self.total_medium,
            Severity::Low => self.total_low,
            Severity::Negligible => self.total_negligible,
        }
    }

    pub fn set(&mut self, severity: Severity, count: u64) {
        match severity {
            Severity::Critical => self.total_critical = count,
            Severity::High => self.total_high = count,
            Severity::Medium => self.total_medium = count,
            Severity::Low => self.total_low = count,
            Severity::Negligible => self.total_negligible = count,
        }
    }

    /// Adds every per-severity count from `other` into `self`.
    pub fn add(&mut self, other: &VulnerabilitySeveritySummary) {
        self.total_critical += other.total_critical;
        self.total_high += other.total_high;
        self.total_medium += other.total_medium;
        self.total_low += other.total_low;
        self.total_negligible += other.total_negligible;
    }

    pub fn total(&self) -> u64 {
        Severity::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_sums_each_severity() {
        let mut a = VulnerabilitySeveritySummary {
            total_critical: 1,
            total_high: 2,
            ..Default::default()
        };
        let b = VulnerabilitySeveritySummary {
            total_critical: 3,
            total_negligible: 4,
            ..Default::default()
        };
        a.add(&b);
        assert_eq!(a.total_critical, 4);
        assert_eq!(a.total_high, 2);
        assert_eq!(a.total_negligible, 4);
        assert_eq!(a.total(), 10);
    }

    #[test]
    fn get_and_set_are_consistent() {
        let mut s = VulnerabilitySeveritySummary::default();
        for (i, sev) in Severity::ALL.iter().enumerate() {
            s.set(*sev, i as u64 + 1);
        }
        for (i, sev) in Severity::ALL.iter().enumerate() {
            assert_eq!(s.get(*sev), i as u64 + 1);
        }
    }
}
