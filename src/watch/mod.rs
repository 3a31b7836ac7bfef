//! Level-triggered watch framework: poller, dedup queue, worker pool.
//!
//! Each watcher is a (discovery, reconcile) pair wired together by a
//! [`ReconcileQueue`]. The [`Poller`] periodically asks a [`DiscoverySource`]
//! for every entity that currently needs attention and enqueues them; a
//! [`ReconcilePool`] of workers dequeues and runs the [`ReconcileHandler`].
//!
//! There is no retry bookkeeping anywhere in this module. A failed or timed
//! out reconcile is logged and dropped; if the entity still needs work it
//! will be re-discovered on the next poll. Reconcilers must therefore be
//! idempotent against the current stored state.

pub mod poller;
pub mod queue;
pub mod reconciler;

pub use poller::Poller;
pub use queue::ReconcileQueue;
pub use reconciler::ReconcilePool;

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;

/// An item that can flow through the watch pipeline.
///
/// Identity (`Eq + Hash`) is what the queue dedups on, so two events for the
/// same entity must compare equal.
pub trait ReconcileItem: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T: Clone + Eq + Hash + Debug + Send + Sync + 'static> ReconcileItem for T {}

/// Produces the full set of entities that currently need reconciliation.
///
/// Discovery is stateless: it queries the store for the current backlog every
/// time, so missed cycles self-heal.
pub trait DiscoverySource: Send + Sync + 'static {
    type Item: ReconcileItem;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the entities needing attention right now. `queued` is the
    /// number of items already waiting in the queue, so sources with a
    /// processing budget can cap how much they fetch.
    fn discover(
        &self,
        queued: usize,
    ) -> impl Future<Output = Result<Vec<Self::Item>, Self::Error>> + Send;
}

/// Drives one entity towards its desired state.
pub trait ReconcileHandler: Send + Sync + 'static {
    type Item: ReconcileItem;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reconciles a single entity. Must be idempotent: the same item may be
    /// delivered again on any later poll cycle.
    fn reconcile(&self, item: Self::Item) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
