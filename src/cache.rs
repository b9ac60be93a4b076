//! Cache adapters: the read/replace bridge for the value an executor threads
//! through sequential batches of one bucket.

use std::sync::Arc;

use parking_lot::Mutex;

/// Read/replace contract the fetcher uses around each batch.
///
/// Implementations can be backed by anything as long as the value shape is
/// what the executor expects.
pub trait CacheAdapter<C>: Send + Sync {
    /// Current value.
    fn read(&self) -> C;

    /// Replace the current value.
    fn replace(&self, value: C);
}

/// In-process cell, initialized to `C::default()`.
#[derive(Debug, Default)]
pub struct CellCache<C> {
    value: Mutex<C>,
}

impl<C: Default> CellCache<C> {
    pub fn new() -> Self {
        Self { value: Mutex::new(C::default()) }
    }

    /// Shared, type-erased handle ready for a bucket.
    pub fn shared() -> Arc<dyn CacheAdapter<C>>
    where
        C: Clone + Send + 'static,
    {
        Arc::new(Self::new())
    }
}

impl<C> CellCache<C> {
    pub fn with_value(value: C) -> Self {
        Self { value: Mutex::new(value) }
    }
}

impl<C: Clone + Send> CacheAdapter<C> for CellCache<C> {
    fn read(&self) -> C {
        self.value.lock().clone()
    }

    fn replace(&self, value: C) {
        *self.value.lock() = value;
    }
}

/// Cache choice for a single bucket.
pub enum CachePolicy<C> {
    /// Use the context-level adapter if one was configured, else a fresh
    /// `CellCache` owned by this bucket alone.
    Inherit,
    /// No cache: the executor sees `None` and returned values are dropped.
    Disabled,
    /// Use this adapter. Sharing one `Arc` between buckets shares state.
    Custom(Arc<dyn CacheAdapter<C>>),
}

impl<C> Default for CachePolicy<C> {
    fn default() -> Self {
        Self::Inherit
    }
}

impl<C> Clone for CachePolicy<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Inherit => Self::Inherit,
            Self::Disabled => Self::Disabled,
            Self::Custom(adapter) => Self::Custom(Arc::clone(adapter)),
        }
    }
}

impl<C> std::fmt::Debug for CachePolicy<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inherit => f.write_str("Inherit"),
            Self::Disabled => f.write_str("Disabled"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl<C: Clone + Default + Send + 'static> CachePolicy<C> {
    /// Resolve to the adapter a bucket should hold.
    pub(crate) fn resolve(
        &self,
        shared: Option<&Arc<dyn CacheAdapter<C>>>,
    ) -> Option<Arc<dyn CacheAdapter<C>>> {
        match self {
            Self::Custom(adapter) => Some(Arc::clone(adapter)),
            Self::Disabled => None,
            Self::Inherit => Some(shared.cloned().unwrap_or_else(CellCache::<C>::shared)),
        }
    }
}
