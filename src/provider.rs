//! Cloud provider abstraction.
//!
//! The reconciliation core never drives cloud operations itself; the
//! asset-scan runner does. The core only requires that providers exist and
//! are injectable, so this module defines the narrow trait and an explicit
//! registry built once at process start. There is no import-time
//! registration.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Supported provider kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
    Docker,
    Kubernetes,
    External,
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloudProvider::Aws => "AWS",
            CloudProvider::Azure => "Azure",
            CloudProvider::Gcp => "GCP",
            CloudProvider::Docker => "Docker",
            CloudProvider::Kubernetes => "Kubernetes",
            CloudProvider::External => "External",
        };
        write!(f, "{name}")
    }
}

/// A cloud provider adapter, owned by the out-of-scope scan runner.
///
/// Dyn-compatible on purpose: the registry stores heterogeneous adapters
/// behind `Arc<dyn Provider>`.
pub trait Provider: Send + Sync {
    /// Which provider this adapter talks to.
    fn kind(&self) -> CloudProvider;
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider {0} registered twice")]
    AlreadyRegistered(CloudProvider),

    #[error("no provider registered for {0}")]
    NotRegistered(CloudProvider),

    #[error("no providers registered")]
    Empty,
}

/// An explicit provider registry, built once and passed by reference.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<CloudProvider, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter. Double registration of the same kind is a
    /// wiring bug and is rejected.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Result<(), ProviderError> {
        let kind = provider.kind();
        if self.providers.contains_key(&kind) {
            return Err(ProviderError::AlreadyRegistered(kind));
        }
        self.providers.insert(kind, provider);
        Ok(())
    }

    pub fn get(&self, kind: CloudProvider) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(ProviderError::NotRegistered(kind))
    }

    /// The registered kinds, in stable order.
    pub fn kinds(&self) -> Vec<CloudProvider> {
        self.providers.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
