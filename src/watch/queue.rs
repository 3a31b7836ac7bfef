//! Dedup FIFO queue between poller and worker pool.
//!
//! The same entity is typically rediscovered on every poll cycle while it
//! still needs work, so the queue refuses duplicates of anything currently
//! queued or being processed. Workers call [`ReconcileQueue::done`] when they
//! finish an item, after which the entity may be enqueued again.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::ReconcileItem;

struct Inner<T> {
    items: VecDeque<T>,
    /// Everything currently queued or handed out to a worker.
    inflight: HashSet<T>,
}

/// An unbounded MPMC queue that drops duplicate items.
pub struct ReconcileQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
}

impl<T: ReconcileItem> Default for ReconcileQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ReconcileItem> ReconcileQueue<T> {
    pub fn new() -> Self {
        ReconcileQueue {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                inflight: HashSet::new(),
            }),
            notify: Notify::new(),
        }
    }

    /// Number of items waiting to be dequeued (excludes items being
    /// processed).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueues an item unless an equal item is already queued or in
    /// flight. Returns whether the item was accepted.
    pub fn enqueue(&self, item: T) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.inflight.insert(item.clone()) {
            return false;
        }
        inner.items.push_back(item);
        drop(inner);
        self.notify.notify_one();
        true
    }

    /// Dequeues without waiting. The item stays tracked until [`done`] is
    /// called for it.
    ///
    /// [`done`]: ReconcileQueue::done
    pub fn try_dequeue(&self) -> Option<T> {
        self.inner.lock().unwrap().items.pop_front()
    }

    /// Waits for an item, returning `None` once `cancel` fires.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<T> {
        loop {
            // Register for notification before checking, so an enqueue that
            // lands between the check and the await is not lost.
            let notified = self.notify.notified();
            if let Some(item) = self.try_dequeue() {
                return Some(item);
            }
            tokio::select! {
                () = notified => {}
                () = cancel.cancelled() => return None,
            }
        }
    }

    /// Marks an item as finished processing, allowing it to be enqueued
    /// again.
    pub fn done(&self, item: &T) {
        self.inner.lock().unwrap().inflight.remove(item);
    }
}
