//! Periodic trigger.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{TriggerContext, TriggerFactory, TriggerHandle, INTERVAL};
use crate::error::TriggerError;
use crate::executor::BatchExecutor;
use crate::scheduler::Bucket;
use crate::telemetry;

/// `{ "interval": ms }`, ms > 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct IntervalConfig {
    pub interval: u64,
}

/// Flushes a bucket every `interval` milliseconds on a background task.
///
/// The loop sleeps, fetches, then sleeps again, so a slow executor delays the
/// next tick rather than stacking fetches. Stopping cancels the sleep; a fetch
/// already running is left to finish.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalTrigger;

impl<E: BatchExecutor> TriggerFactory<E> for IntervalTrigger {
    fn start(&self, ctx: TriggerContext<'_, E>) -> Result<TriggerHandle, TriggerError> {
        let IntervalConfig { interval } = ctx.parse()?;
        if interval == 0 {
            return Err(ctx.invalid("interval must be positive"));
        }

        let period = Duration::from_millis(interval);
        let shutdown = CancellationToken::new();
        ctx.runtime.spawn(interval_loop(
            Arc::downgrade(ctx.bucket),
            period,
            shutdown.clone(),
        ));

        Ok(TriggerHandle::new(INTERVAL, ctx.config.clone(), move || {
            shutdown.cancel();
        }))
    }
}

async fn interval_loop<E: BatchExecutor>(
    weak: Weak<Bucket<E>>,
    period: Duration,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(period) => {}
        }

        // The bucket was replaced and released.
        let Some(bucket) = weak.upgrade() else { break };
        if let Err(err) = bucket.fetch().await {
            tracing::warn!(
                bucket = %bucket.id(),
                trigger = INTERVAL,
                error = %err,
                "triggered fetch failed"
            );
            telemetry::record_trigger_failure(bucket.id().as_str(), INTERVAL);
        }
    }
    tracing::debug!(trigger = INTERVAL, "interval loop exited");
}
