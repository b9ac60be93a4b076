//! Trigger subsystem: policies that decide when a bucket is flushed.
//!
//! Kinds are looked up in a [`TriggerRegistry`] by tag. Built-ins are
//! `queue-size` and `interval`; any tag without a registered factory starts a
//! manual trigger, which has no background activity. New kinds are added by
//! registering a factory, without touching the existing ones.

mod interval;
mod queue_size;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;

use crate::error::TriggerError;
use crate::executor::BatchExecutor;
use crate::scheduler::Bucket;

pub use interval::{IntervalConfig, IntervalTrigger};
pub use queue_size::{QueueSizeConfig, QueueSizeTrigger};

/// Tag of the size-threshold trigger.
pub const QUEUE_SIZE: &str = "queue-size";
/// Tag of the periodic trigger.
pub const INTERVAL: &str = "interval";
/// Conventional tag for an explicit no-op trigger.
pub const MANUAL: &str = "manual";

type StopFn = Box<dyn FnOnce() + Send>;

/// A started trigger: its kind, raw config and stop operation.
pub struct TriggerHandle {
    kind: String,
    config: Value,
    stopped: AtomicBool,
    stop_fn: Mutex<Option<StopFn>>,
}

impl TriggerHandle {
    pub fn new(
        kind: impl Into<String>,
        config: Value,
        stop: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            kind: kind.into(),
            config,
            stopped: AtomicBool::new(false),
            stop_fn: Mutex::new(Some(Box::new(stop))),
        }
    }

    /// A trigger with no background activity.
    pub fn manual(kind: impl Into<String>, config: Value) -> Self {
        Self {
            kind: kind.into(),
            config,
            stopped: AtomicBool::new(false),
            stop_fn: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop future automatic dispatches. Returns false if already stopped.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(stop) = self.stop_fn.lock().take() {
            stop();
        }
        tracing::debug!(kind = %self.kind, "trigger stopped");
        true
    }
}

impl std::fmt::Debug for TriggerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerHandle")
            .field("kind", &self.kind)
            .field("config", &self.config)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Everything a factory needs to attach a trigger to a bucket.
pub struct TriggerContext<'a, E: BatchExecutor> {
    pub kind: &'a str,
    pub config: &'a Value,
    /// Factories should hold only a `Weak` to the bucket past `start`.
    pub bucket: &'a Arc<Bucket<E>>,
    /// Runtime used for background dispatch.
    pub runtime: &'a Handle,
}

impl<E: BatchExecutor> TriggerContext<'_, E> {
    /// Deserialize the raw config into a typed one.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, TriggerError> {
        serde_json::from_value(self.config.clone()).map_err(|e| self.invalid(e.to_string()))
    }

    pub fn invalid(&self, reason: impl Into<String>) -> TriggerError {
        TriggerError::InvalidConfig {
            kind: self.kind.to_string(),
            reason: reason.into(),
        }
    }
}

/// Starts triggers of one kind.
pub trait TriggerFactory<E: BatchExecutor>: Send + Sync {
    fn start(&self, ctx: TriggerContext<'_, E>) -> Result<TriggerHandle, TriggerError>;
}

struct FnFactory<F>(F);

impl<E, F> TriggerFactory<E> for FnFactory<F>
where
    E: BatchExecutor,
    F: Fn(TriggerContext<'_, E>) -> Result<TriggerHandle, TriggerError> + Send + Sync,
{
    fn start(&self, ctx: TriggerContext<'_, E>) -> Result<TriggerHandle, TriggerError> {
        (self.0)(ctx)
    }
}

/// Maps trigger kind tags to factories.
pub struct TriggerRegistry<E: BatchExecutor> {
    factories: HashMap<String, Arc<dyn TriggerFactory<E>>>,
}

impl<E: BatchExecutor> TriggerRegistry<E> {
    /// Registry with the built-in kinds.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(QUEUE_SIZE, QueueSizeTrigger);
        registry.register(INTERVAL, IntervalTrigger);
        registry
    }

    /// Registry with no kinds; every tag starts a manual trigger.
    pub fn empty() -> Self {
        Self { factories: HashMap::new() }
    }

    /// Register a factory. Last registration for a kind wins.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        factory: impl TriggerFactory<E> + 'static,
    ) -> Option<Arc<dyn TriggerFactory<E>>> {
        self.factories.insert(kind.into(), Arc::new(factory))
    }

    /// Register a closure as a factory.
    pub fn register_fn<F>(&mut self, kind: impl Into<String>, start: F)
    where
        F: Fn(TriggerContext<'_, E>) -> Result<TriggerHandle, TriggerError>
            + Send
            + Sync
            + 'static,
    {
        self.register(kind, FnFactory(start));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Start a trigger of `kind` on `bucket`. Unknown kinds start as manual.
    pub fn start(
        &self,
        kind: &str,
        config: &Value,
        bucket: &Arc<Bucket<E>>,
        runtime: &Handle,
    ) -> Result<TriggerHandle, TriggerError> {
        let Some(factory) = self.factories.get(kind) else {
            tracing::debug!(bucket = %bucket.id(), kind, "no factory for trigger kind; manual");
            return Ok(TriggerHandle::manual(kind, config.clone()));
        };
        factory.start(TriggerContext { kind, config, bucket, runtime })
    }
}

impl<E: BatchExecutor> Default for TriggerRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
