//! batch-buckets
//!
//! A request-batching scheduler. Callers enqueue individual tasks into named
//! buckets and get a completion back; triggers decide when a bucket's queue is
//! flushed to a [`BatchExecutor`] as one batch, and each caller's completion
//! is settled with its own result.
//!
//! # Components
//!
//! - **Queue**: per-bucket pending tasks with an atomic take-all claim
//! - **Trigger**: flush policies (`queue-size`, `interval`, manual, custom)
//! - **Bucket**: one queue, its triggers, merged options, optional cache
//! - **Context**: registry of buckets with a default bucket; start/stop root
//! - **Fetcher**: claim, execute, settle, update cache
//!
//! # Example
//!
//! ```ignore
//! let config = ContextConfig::new()
//!     .bucket(DEFAULT_BUCKET, BucketConfig::new().queue_size(3));
//! let ctx = Context::start(MyExecutor, config)?;
//! let result = ctx.enqueue("users", UserQuery::by_id(7)).await?;
//! ctx.stop();
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod scheduler;
pub mod telemetry;
pub mod trigger;

pub use cache::{CacheAdapter, CachePolicy, CellCache};
pub use error::{BatchError, ContextError, ExecutorError, ResolveAfterError, TriggerError};
pub use executor::{BatchExecutor, BatchRequest, BatchResponse, ExecutionOptions};
pub use scheduler::{
    Bucket, BucketConfig, BucketId, Completion, Context, ContextConfig, Flush, DEFAULT_BUCKET,
};
pub use trigger::{TriggerContext, TriggerFactory, TriggerHandle, TriggerRegistry};
