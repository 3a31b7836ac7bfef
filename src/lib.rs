//! Scanwatch - a level-triggered reconciliation orchestrator for asset
//! security scans.
//!
//! This library provides the control-loop framework (queue, poller, worker
//! pool), the Scan and Finding lifecycle state machines built on it, and the
//! asset-scan result processor that turns scanner output into findings.

pub mod config;
pub mod findings;
pub mod orchestrator;
pub mod processor;
pub mod provider;
pub mod scans;
pub mod store;
pub mod types;
pub mod watch;

#[cfg(test)]
pub mod test_utils;
