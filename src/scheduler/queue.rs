//! Pending-task queue for one bucket.
//!
//! Appends and claims share one mutex, so a claim is a single indivisible
//! take-all-and-clear: anything appended afterwards lands in the emptied queue
//! and belongs to a later claim. Observers run after the lock is released and
//! receive the queue length the mutation left behind.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// Callback invoked with the queue length after every mutation.
pub type QueueObserver = Arc<dyn Fn(usize) + Send + Sync>;

/// Handle for detaching an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Ordered, concurrency-safe queue with atomic claim.
pub struct Queue<T> {
    items: Mutex<VecDeque<T>>,
    observers: RwLock<Vec<(ObserverId, QueueObserver)>>,
    next_observer: AtomicU64,
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            observers: RwLock::new(Vec::new()),
            next_observer: AtomicU64::new(1),
        }
    }

    /// Append an item. Returns the queue length right after the append.
    pub fn push(&self, item: T) -> usize {
        let len = {
            let mut items = self.items.lock();
            items.push_back(item);
            items.len()
        };
        self.notify(len);
        len
    }

    /// Take every queued item, leaving the queue empty.
    pub fn take_all(&self) -> Vec<T> {
        let taken = std::mem::take(&mut *self.items.lock());
        if !taken.is_empty() {
            self.notify(0);
        }
        taken.into()
    }

    /// Take every queued item, but only if at least `min` are queued.
    ///
    /// The length check and the claim happen under the same lock.
    pub fn take_if_len_at_least(&self, min: usize) -> Option<Vec<T>> {
        let taken = {
            let mut items = self.items.lock();
            if items.is_empty() || items.len() < min {
                return None;
            }
            std::mem::take(&mut *items)
        };
        self.notify(0);
        Some(taken.into())
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Attach an observer. It fires on every subsequent mutation.
    pub fn watch(&self, observer: QueueObserver) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    /// Detach an observer. Returns false if it was already detached.
    pub fn unwatch(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    fn notify(&self, len: usize) {
        // Snapshot so observers may mutate the queue or detach themselves.
        let observers: Vec<QueueObserver> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer(len);
        }
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("len", &self.len())
            .field("observers", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
