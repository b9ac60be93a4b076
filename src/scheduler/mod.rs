//! Bucket scheduling: queues, buckets, the fetcher and the context that owns
//! them.
//!
//! Tasks are queued per bucket, claimed atomically by whichever trigger or
//! caller flushes first, executed as one batch, and settled back to each
//! caller's completion.

mod bucket;
mod context;
mod fetch;
mod pending;
pub mod queue;

pub use bucket::{Bucket, BucketConfig, BucketId, DEFAULT_BUCKET};
pub use context::{Context, ContextConfig};
pub use fetch::Flush;
pub use pending::{Completion, PendingTask, Settler, TaskResult};
pub use queue::{ObserverId, Queue, QueueObserver};
