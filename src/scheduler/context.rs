//! Context: the registry of buckets and the lifecycle root.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use super::bucket::{Bucket, BucketConfig, BucketId, DEFAULT_BUCKET};
use super::fetch::Flush;
use super::pending::Completion;
use crate::cache::CacheAdapter;
use crate::error::{BatchError, ContextError, ResolveAfterError};
use crate::executor::{BatchExecutor, ExecutionOptions};
use crate::trigger::TriggerRegistry;

/// Start configuration for a [`Context`].
///
/// ```text
/// { buckets: { <id>: { triggers: { <kind>: <config> }, execution-options: {..} } },
///   execution-options: {..} }
/// ```
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, bound = "")]
pub struct ContextConfig<C> {
    pub buckets: BTreeMap<BucketId, BucketConfig<C>>,
    /// Defaults every bucket's options are merged over.
    pub execution_options: ExecutionOptions,
    /// Adapter shared by every bucket whose cache policy is `Inherit`. When
    /// unset, each such bucket gets its own fresh cell.
    #[serde(skip)]
    pub cache: Option<Arc<dyn CacheAdapter<C>>>,
}

impl<C> ContextConfig<C> {
    pub fn new() -> Self {
        Self {
            buckets: BTreeMap::new(),
            execution_options: ExecutionOptions::new(),
            cache: None,
        }
    }

    pub fn bucket(mut self, id: impl Into<BucketId>, config: BucketConfig<C>) -> Self {
        self.buckets.insert(id.into(), config);
        self
    }

    pub fn options(mut self, options: ExecutionOptions) -> Self {
        self.execution_options = options;
        self
    }

    pub fn shared_cache(mut self, cache: Arc<dyn CacheAdapter<C>>) -> Self {
        self.cache = Some(cache);
        self
    }
}

impl<C> Default for ContextConfig<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for ContextConfig<C> {
    fn clone(&self) -> Self {
        Self {
            buckets: self.buckets.clone(),
            execution_options: self.execution_options.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<C> std::fmt::Debug for ContextConfig<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextConfig")
            .field("buckets", &self.buckets)
            .field("execution_options", &self.execution_options)
            .field("shared_cache", &self.cache.is_some())
            .finish()
    }
}

/// What every bucket of one context is built from.
struct BucketEnv<E: BatchExecutor> {
    executor: Arc<E>,
    options: ExecutionOptions,
    shared_cache: Option<Arc<dyn CacheAdapter<E::Cache>>>,
    registry: TriggerRegistry<E>,
    runtime: Handle,
}

impl<E: BatchExecutor> BucketEnv<E> {
    fn start_bucket(
        &self,
        id: BucketId,
        config: &BucketConfig<E::Cache>,
    ) -> Result<Arc<Bucket<E>>, ContextError> {
        let options = self.options.merged(&config.execution_options);
        let cache = config.cache.resolve(self.shared_cache.as_ref());
        let bucket = Bucket::new(id, options, cache, Arc::clone(&self.executor));
        bucket
            .start_triggers(&config.triggers, &self.registry, &self.runtime)
            .map_err(|source| ContextError::Trigger {
                bucket: bucket.id().to_string(),
                source,
            })?;
        Ok(bucket)
    }
}

/// Owns the buckets of one scheduler instance.
///
/// Must be started from within a tokio runtime; triggers dispatch onto that
/// runtime even when `enqueue` is called from a plain thread.
pub struct Context<E: BatchExecutor> {
    env: BucketEnv<E>,
    buckets: DashMap<BucketId, Arc<Bucket<E>>>,
    default_bucket: RwLock<Arc<Bucket<E>>>,
}

impl<E: BatchExecutor> Context<E> {
    /// Start with the built-in trigger kinds.
    pub fn start(executor: E, config: ContextConfig<E::Cache>) -> Result<Self, ContextError> {
        Self::start_with_registry(Arc::new(executor), config, TriggerRegistry::new())
    }

    /// Start with a custom trigger registry.
    pub fn start_with_registry(
        executor: Arc<E>,
        config: ContextConfig<E::Cache>,
        registry: TriggerRegistry<E>,
    ) -> Result<Self, ContextError> {
        let runtime = Handle::try_current().map_err(|_| ContextError::NoRuntime)?;
        let ContextConfig { mut buckets, execution_options, cache } = config;
        let env = BucketEnv {
            executor,
            options: execution_options,
            shared_cache: cache,
            registry,
            runtime,
        };

        let default_config = buckets.remove(DEFAULT_BUCKET).unwrap_or_default();
        let default_bucket = env.start_bucket(BucketId::default_bucket(), &default_config)?;

        let started = DashMap::new();
        started.insert(BucketId::default_bucket(), Arc::clone(&default_bucket));
        for (id, bucket_config) in buckets {
            match env.start_bucket(id.clone(), &bucket_config) {
                Ok(bucket) => {
                    started.insert(id, bucket);
                }
                Err(err) => {
                    for entry in started.iter() {
                        entry.value().stop_triggers();
                    }
                    return Err(err);
                }
            }
        }

        tracing::info!(buckets = started.len(), "context started");
        Ok(Self {
            env,
            buckets: started,
            default_bucket: RwLock::new(default_bucket),
        })
    }

    /// Stop every trigger of every bucket. Queued tasks stay queued and their
    /// completions stay pending; a manual `fetch` still works afterwards.
    pub fn stop(&self) {
        for bucket in self.snapshot() {
            bucket.stop_triggers();
        }
        tracing::info!(buckets = self.buckets.len(), "context stopped");
    }

    /// Register and start a bucket.
    ///
    /// Replacing an existing id returns the old bucket; its triggers keep
    /// running until the caller stops them.
    pub fn add_bucket(
        &self,
        id: impl Into<BucketId>,
        config: BucketConfig<E::Cache>,
    ) -> Result<Option<Arc<Bucket<E>>>, ContextError> {
        let id = id.into();
        let bucket = self.env.start_bucket(id.clone(), &config)?;
        if id.is_default() {
            *self.default_bucket.write() = Arc::clone(&bucket);
        }
        let replaced = self.buckets.insert(id.clone(), bucket);
        tracing::info!(bucket = %id, replaced = replaced.is_some(), "bucket registered");
        Ok(replaced)
    }

    /// Await `upstream`, then register a bucket configured from its value.
    ///
    /// The value is passed through unchanged, also inside
    /// `ResolveAfterError::Register` when registration fails. An upstream
    /// failure registers nothing.
    pub async fn resolve_after<T, UpErr, Fut, P>(
        &self,
        upstream: Fut,
        id: impl Into<BucketId>,
        producer: P,
    ) -> Result<T, ResolveAfterError<T, UpErr>>
    where
        Fut: Future<Output = Result<T, UpErr>>,
        P: FnOnce(&T) -> BucketConfig<E::Cache>,
    {
        let value = upstream.await.map_err(ResolveAfterError::Upstream)?;
        match self.add_bucket(id, producer(&value)) {
            Ok(_) => Ok(value),
            Err(source) => Err(ResolveAfterError::Register { value, source }),
        }
    }

    /// The named bucket, or the default bucket if there is none by that name.
    pub fn bucket_for(&self, id: &str) -> Arc<Bucket<E>> {
        match self.buckets.get(id) {
            Some(entry) => Arc::clone(entry.value()),
            None => Arc::clone(&*self.default_bucket.read()),
        }
    }

    /// The named bucket only.
    pub fn bucket(&self, id: &str) -> Option<Arc<Bucket<E>>> {
        self.buckets.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn bucket_ids(&self) -> Vec<BucketId> {
        let mut ids: Vec<BucketId> = self.buckets.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Queue a task on `id` (or the default bucket) and return its completion.
    pub fn enqueue(&self, id: &str, task: E::Task) -> Completion<E::Output> {
        self.bucket_for(id).enqueue(task)
    }

    /// Flush one bucket now.
    pub async fn fetch(&self, id: &str) -> Result<Flush<E::Output>, BatchError> {
        self.bucket_for(id).fetch().await
    }

    /// Flush every bucket once, one after another.
    ///
    /// Every bucket is attempted even if an earlier one fails; the first
    /// failure is returned. On success returns the number of tasks flushed.
    pub async fn fetch_all(&self) -> Result<usize, BatchError> {
        let mut flushed = 0;
        let mut first_err = None;
        for bucket in self.snapshot() {
            match bucket.fetch().await {
                Ok(flush) => flushed += flush.len(),
                Err(err) => {
                    tracing::warn!(bucket = %bucket.id(), error = %err, "fetch_all: bucket failed");
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(flushed),
        }
    }

    /// Tasks currently queued on `id` (or the default bucket).
    pub fn queue_len(&self, id: &str) -> usize {
        self.bucket_for(id).queue_len()
    }

    /// Default execution options every bucket is merged over.
    pub fn default_options(&self) -> &ExecutionOptions {
        &self.env.options
    }

    pub fn executor(&self) -> &Arc<E> {
        &self.env.executor
    }

    fn snapshot(&self) -> Vec<Arc<Bucket<E>>> {
        self.buckets.iter().map(|entry| Arc::clone(entry.value())).collect()
    }
}

impl<E: BatchExecutor> std::fmt::Debug for Context<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("buckets", &self.bucket_ids())
            .field("options", &self.env.options)
            .finish()
    }
}
