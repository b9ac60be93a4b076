//! Buckets: one queue, its triggers, merged options and optional cache.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::runtime::Handle;

use super::pending::{Completion, PendingTask};
use super::queue::Queue;
use crate::cache::{CacheAdapter, CachePolicy};
use crate::error::TriggerError;
use crate::executor::{BatchExecutor, ExecutionOptions};
use crate::telemetry;
use crate::trigger::{TriggerHandle, TriggerRegistry, INTERVAL, QUEUE_SIZE};

/// Reserved id of the bucket that always exists after start.
pub const DEFAULT_BUCKET: &str = "default";

/// Name of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketId(String);

impl BucketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The reserved default bucket id.
    pub fn default_bucket() -> Self {
        Self(DEFAULT_BUCKET.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_BUCKET
    }
}

impl std::fmt::Display for BucketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for BucketId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BucketId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BucketId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Per-bucket start configuration.
///
/// `triggers` maps a trigger kind to its raw config; unknown kinds are kept
/// and start as manual triggers.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, bound = "")]
pub struct BucketConfig<C> {
    pub triggers: BTreeMap<String, Value>,
    pub execution_options: ExecutionOptions,
    #[serde(skip)]
    pub cache: CachePolicy<C>,
}

impl<C> BucketConfig<C> {
    pub fn new() -> Self {
        Self {
            triggers: BTreeMap::new(),
            execution_options: ExecutionOptions::new(),
            cache: CachePolicy::Inherit,
        }
    }

    /// Add a trigger of any kind, replacing an earlier one of the same kind.
    pub fn trigger(mut self, kind: impl Into<String>, config: Value) -> Self {
        self.triggers.insert(kind.into(), config);
        self
    }

    /// Flush whenever `threshold` tasks are queued.
    pub fn queue_size(self, threshold: usize) -> Self {
        self.trigger(QUEUE_SIZE, json!({ "threshold": threshold }))
    }

    /// Flush every `period`.
    pub fn interval(self, period: Duration) -> Self {
        let millis = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        self.trigger(INTERVAL, json!({ "interval": millis }))
    }

    pub fn options(mut self, options: ExecutionOptions) -> Self {
        self.execution_options = options;
        self
    }

    pub fn cache(mut self, cache: CachePolicy<C>) -> Self {
        self.cache = cache;
        self
    }
}

impl<C> Default for BucketConfig<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for BucketConfig<C> {
    fn clone(&self) -> Self {
        Self {
            triggers: self.triggers.clone(),
            execution_options: self.execution_options.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<C> std::fmt::Debug for BucketConfig<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketConfig")
            .field("triggers", &self.triggers)
            .field("execution_options", &self.execution_options)
            .field("cache", &self.cache)
            .finish()
    }
}

pub(crate) type PendingFor<E> =
    PendingTask<<E as BatchExecutor>::Task, <E as BatchExecutor>::Output>;

/// A named accumulation unit.
pub struct Bucket<E: BatchExecutor> {
    id: BucketId,
    queue: Queue<PendingFor<E>>,
    triggers: Mutex<BTreeMap<String, Arc<TriggerHandle>>>,
    pub(super) options: ExecutionOptions,
    pub(super) cache: Option<Arc<dyn CacheAdapter<E::Cache>>>,
    pub(super) executor: Arc<E>,
}

impl<E: BatchExecutor> Bucket<E> {
    pub(crate) fn new(
        id: BucketId,
        options: ExecutionOptions,
        cache: Option<Arc<dyn CacheAdapter<E::Cache>>>,
        executor: Arc<E>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            queue: Queue::new(),
            triggers: Mutex::new(BTreeMap::new()),
            options,
            cache,
            executor,
        })
    }

    pub fn id(&self) -> &BucketId {
        &self.id
    }

    /// Merged execution options handed to the executor.
    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    pub fn cache(&self) -> Option<&Arc<dyn CacheAdapter<E::Cache>>> {
        self.cache.as_ref()
    }

    pub fn queue(&self) -> &Queue<PendingFor<E>> {
        &self.queue
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Queue a task and return its completion. Never waits on the executor.
    pub fn enqueue(&self, task: E::Task) -> Completion<E::Output> {
        let (pending, completion) = PendingTask::new(task);
        let depth = self.queue.push(pending);
        tracing::debug!(bucket = %self.id, depth, "task enqueued");
        telemetry::record_task_enqueued(self.id.as_str());
        // Observers may have claimed during the push.
        self.record_depth();
        completion
    }

    /// Atomically claim everything queued.
    pub fn claim(&self) -> Vec<PendingFor<E>> {
        let batch = self.queue.take_all();
        if !batch.is_empty() {
            self.record_depth();
        }
        batch
    }

    /// Atomically claim everything queued, if at least `min` tasks are queued.
    pub fn claim_at_least(&self, min: usize) -> Option<Vec<PendingFor<E>>> {
        let batch = self.queue.take_if_len_at_least(min)?;
        self.record_depth();
        Some(batch)
    }

    fn record_depth(&self) {
        telemetry::record_queue_depth(self.id.as_str(), self.queue.len());
    }

    /// Start every configured trigger. On failure, triggers already started
    /// for this call are stopped again.
    pub(crate) fn start_triggers(
        self: &Arc<Self>,
        specs: &BTreeMap<String, Value>,
        registry: &TriggerRegistry<E>,
        runtime: &Handle,
    ) -> Result<(), TriggerError> {
        let mut started = BTreeMap::new();
        for (kind, config) in specs {
            match registry.start(kind, config, self, runtime) {
                Ok(handle) => {
                    started.insert(kind.clone(), Arc::new(handle));
                }
                Err(err) => {
                    for handle in started.values() {
                        handle.stop();
                    }
                    return Err(err);
                }
            }
        }
        if !started.is_empty() {
            tracing::info!(
                bucket = %self.id,
                triggers = ?started.keys().collect::<Vec<_>>(),
                "triggers started"
            );
        }
        self.triggers.lock().extend(started);
        Ok(())
    }

    /// Kinds of the triggers attached to this bucket.
    pub fn trigger_kinds(&self) -> Vec<String> {
        self.triggers.lock().keys().cloned().collect()
    }

    /// Whether the trigger of `kind` exists and is still active.
    pub fn trigger_active(&self, kind: &str) -> bool {
        self.triggers
            .lock()
            .get(kind)
            .map_or(false, |handle| !handle.is_stopped())
    }

    /// Stop one trigger. Returns false if absent or already stopped.
    pub fn stop_trigger(&self, kind: &str) -> bool {
        // Stop closures may call back into this bucket; run them unlocked.
        let handle = self.triggers.lock().get(kind).cloned();
        handle.map_or(false, |handle| handle.stop())
    }

    /// Stop every trigger. Safe to call repeatedly.
    pub fn stop_triggers(&self) {
        let handles: Vec<Arc<TriggerHandle>> = self.triggers.lock().values().cloned().collect();
        let stopped = handles.iter().filter(|handle| handle.stop()).count();
        if stopped > 0 {
            tracing::info!(bucket = %self.id, stopped, "triggers stopped");
        }
    }
}

impl<E: BatchExecutor> std::fmt::Debug for Bucket<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("id", &self.id)
            .field("queued", &self.queue.len())
            .field("triggers", &self.trigger_kinds())
            .field("cached", &self.cache.is_some())
            .finish()
    }
}
