//! Size-threshold trigger.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

use super::{TriggerContext, TriggerFactory, TriggerHandle, QUEUE_SIZE};
use crate::error::TriggerError;
use crate::executor::BatchExecutor;
use crate::scheduler::queue::QueueObserver;
use crate::telemetry;

/// `{ "threshold": n }`, n > 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct QueueSizeConfig {
    pub threshold: usize,
}

/// Flushes a bucket as soon as `threshold` tasks are queued.
///
/// The length check and the claim happen together on the enqueuing thread, so
/// each automatic batch holds at least `threshold` tasks and a burst of
/// enqueues never claims tasks that arrived after the crossing. Only the
/// executor call is spawned. Failures are logged and never reach the caller
/// whose enqueue crossed the threshold.
///
/// The stopped check, the claim and the spawn run under a read lock that
/// stop takes for writing. An observer call that started before stop either
/// finishes its dispatch before stop returns or sees the flag and backs off.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueSizeTrigger;

impl<E: BatchExecutor> TriggerFactory<E> for QueueSizeTrigger {
    fn start(&self, ctx: TriggerContext<'_, E>) -> Result<TriggerHandle, TriggerError> {
        let QueueSizeConfig { threshold } = ctx.parse()?;
        if threshold == 0 {
            return Err(ctx.invalid("threshold must be positive"));
        }

        let stopped = Arc::new(RwLock::new(false));
        let weak = Arc::downgrade(ctx.bucket);
        let runtime = ctx.runtime.clone();
        let gate = Arc::clone(&stopped);
        let observer: QueueObserver = Arc::new(move |len| {
            if len < threshold {
                return;
            }
            // Recursive: observers may re-enter on this thread while a stop waits.
            let halted = gate.read_recursive();
            if *halted {
                return;
            }
            let Some(bucket) = weak.upgrade() else { return };
            // Another observer call may have claimed first; that is a no-op.
            let Some(batch) = bucket.claim_at_least(threshold) else { return };
            tracing::debug!(bucket = %bucket.id(), size = batch.len(), "queue-size threshold reached");
            runtime.spawn(async move {
                if let Err(err) = bucket.execute_batch(batch).await {
                    tracing::warn!(
                        bucket = %bucket.id(),
                        trigger = QUEUE_SIZE,
                        error = %err,
                        "triggered fetch failed"
                    );
                    telemetry::record_trigger_failure(bucket.id().as_str(), QUEUE_SIZE);
                }
            });
        });

        let observer_id = ctx.bucket.queue().watch(observer);
        let weak = Arc::downgrade(ctx.bucket);
        Ok(TriggerHandle::new(QUEUE_SIZE, ctx.config.clone(), move || {
            *stopped.write() = true;
            if let Some(bucket) = weak.upgrade() {
                bucket.queue().unwatch(observer_id);
            }
        }))
    }
}
