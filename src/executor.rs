//! The external batch executor contract.
//!
//! The scheduler never looks inside task descriptors. It hands the executor a
//! claimed batch plus the bucket's execution options and cache value, and
//! expects one result per task back, in claim order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ExecutorError;
use crate::scheduler::BucketId;

/// Free-form execution options forwarded to the executor.
///
/// Merging is shallow: keys from the overriding side replace whole values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionOptions(Map<String, Value>);

impl ExecutionOptions {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return `self` with every key of `overrides` applied on top.
    pub fn merged(&self, overrides: &ExecutionOptions) -> ExecutionOptions {
        let mut merged = self.0.clone();
        for (key, value) in &overrides.0 {
            merged.insert(key.clone(), value.clone());
        }
        Self(merged)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for ExecutionOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One claimed batch, as handed to the executor.
#[derive(Debug)]
pub struct BatchRequest<T, C> {
    pub bucket: BucketId,
    pub tasks: Vec<T>,
    pub options: ExecutionOptions,
    /// Current cache value, present when the bucket has a cache adapter.
    pub cache: Option<C>,
}

impl<T, C> BatchRequest<T, C> {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Executor output for one batch.
#[derive(Debug, Clone)]
pub struct BatchResponse<O, C> {
    /// One result per task, aligned with `BatchRequest::tasks`.
    pub results: Vec<O>,
    /// Updated cache value. Ignored when the bucket has no cache adapter.
    pub cache: Option<C>,
}

impl<O, C> BatchResponse<O, C> {
    pub fn new(results: Vec<O>) -> Self {
        Self { results, cache: None }
    }

    pub fn with_cache(mut self, cache: C) -> Self {
        self.cache = Some(cache);
        self
    }
}

/// Performs the actual batched work.
///
/// Implementations may deduplicate, parallelize or reorder work internally, but
/// must return exactly one result per task in the order given.
#[async_trait]
pub trait BatchExecutor: Send + Sync + 'static {
    /// Opaque task descriptor supplied by callers.
    type Task: Send + 'static;
    /// Per-task result. Cloned once: into the caller's completion and into the
    /// aggregate returned to manual fetches.
    type Output: Clone + Send + 'static;
    /// Value threaded across sequential batches of one bucket.
    type Cache: Clone + Default + Send + Sync + 'static;

    async fn execute(
        &self,
        batch: BatchRequest<Self::Task, Self::Cache>,
    ) -> Result<BatchResponse<Self::Output, Self::Cache>, ExecutorError>;
}
