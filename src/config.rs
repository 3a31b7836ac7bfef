//! Orchestrator configuration.
//!
//! Plain struct with named defaults; `from_env` overrides individual knobs
//! from `SCANWATCH_*` environment variables. Unparseable values fall back to
//! the default rather than aborting startup.

use std::time::Duration;

/// Default period between discovery polls (30 seconds).
const DEFAULT_POLL_PERIOD_SECS: u64 = 30;

/// Default per-item reconcile timeout (5 minutes).
const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 300;

/// Default wall-clock budget for a whole scan before it is force-failed
/// (48 hours).
const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 48 * 60 * 60;

/// Default period between finding-summary refresh polls (5 minutes).
const DEFAULT_SUMMARY_UPDATE_PERIOD_SECS: u64 = 300;

/// Default cap on findings fetched per summary-refresh cycle.
const DEFAULT_MAX_PROCESSING_COUNT: usize = 100;

/// Configuration for the reconciliation orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Period between scan discovery polls.
    ///
    /// Default: 30 seconds. Configure via `SCANWATCH_POLL_PERIOD_SECS`.
    pub poll_period: Duration,

    /// Timeout applied to each individual reconcile and to each discovery
    /// cycle.
    ///
    /// Default: 5 minutes. Configure via `SCANWATCH_RECONCILE_TIMEOUT_SECS`.
    pub reconcile_timeout: Duration,

    /// Wall-clock budget for a scan from its start time; scans still running
    /// past it are force-failed.
    ///
    /// Default: 48 hours. Configure via `SCANWATCH_SCAN_TIMEOUT_SECS`.
    pub scan_timeout: Duration,

    /// Period between finding-summary refresh polls.
    ///
    /// Default: 5 minutes. Configure via
    /// `SCANWATCH_SUMMARY_UPDATE_PERIOD_SECS`.
    pub summary_update_period: Duration,

    /// Upper bound on stale findings fetched per summary-refresh cycle,
    /// shared with whatever is already queued.
    ///
    /// Default: 100. Configure via `SCANWATCH_MAX_PROCESSING_COUNT`.
    pub max_processing_count: usize,

    /// Number of reconcile workers per pool.
    ///
    /// Default: available parallelism. Configure via
    /// `SCANWATCH_WORKER_COUNT`.
    pub worker_count: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl OrchestratorConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        OrchestratorConfig {
            poll_period: Duration::from_secs(DEFAULT_POLL_PERIOD_SECS),
            reconcile_timeout: Duration::from_secs(DEFAULT_RECONCILE_TIMEOUT_SECS),
            scan_timeout: Duration::from_secs(DEFAULT_SCAN_TIMEOUT_SECS),
            summary_update_period: Duration::from_secs(DEFAULT_SUMMARY_UPDATE_PERIOD_SECS),
            max_processing_count: DEFAULT_MAX_PROCESSING_COUNT,
            worker_count: default_worker_count(),
        }
    }

    /// Creates a config from `SCANWATCH_*` environment variables, falling
    /// back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::new();
        OrchestratorConfig {
            poll_period: env_u64("SCANWATCH_POLL_PERIOD_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_period),
            reconcile_timeout: env_u64("SCANWATCH_RECONCILE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconcile_timeout),
            scan_timeout: env_u64("SCANWATCH_SCAN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.scan_timeout),
            summary_update_period: env_u64("SCANWATCH_SUMMARY_UPDATE_PERIOD_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.summary_update_period),
            max_processing_count: env_u64("SCANWATCH_MAX_PROCESSING_COUNT")
                .map(|n| n as usize)
                .unwrap_or(defaults.max_processing_count),
            worker_count: env_u64("SCANWATCH_WORKER_COUNT")
                .map(|n| (n as usize).max(1))
                .unwrap_or(defaults.worker_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_expected_values() {
        let config = OrchestratorConfig::new();
        assert_eq!(config.poll_period, Duration::from_secs(30));
        assert_eq!(config.reconcile_timeout, Duration::from_secs(300));
        assert_eq!(config.scan_timeout, Duration::from_secs(48 * 60 * 60));
        assert_eq!(config.summary_update_period, Duration::from_secs(300));
        assert_eq!(config.max_processing_count, 100);
        assert!(config.worker_count >= 1);
    }
}
