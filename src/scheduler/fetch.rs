//! Fetcher: claim a bucket's queue, run the executor, settle completions.
//!
//! All flushing goes through here, whether a trigger fired or a caller asked
//! for it. Trigger call sites catch and log the returned error; manual callers
//! get it back.

use std::time::Instant;

use tracing::Instrument;

use super::bucket::{Bucket, PendingFor};
use super::pending::{PendingTask, Settler};
use crate::error::BatchError;
use crate::executor::{BatchExecutor, BatchRequest, BatchResponse};
use crate::telemetry::{self, BatchSpan, SpanExt};

/// Result of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flush<O> {
    /// Nothing was queued; the executor was not called.
    Empty,
    /// The executor ran; one result per claimed task, in claim order.
    Completed(Vec<O>),
}

impl<O> Flush<O> {
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Completed(results) => results.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_results(self) -> Vec<O> {
        match self {
            Self::Empty => Vec::new(),
            Self::Completed(results) => results,
        }
    }
}

impl<E: BatchExecutor> Bucket<E> {
    /// Claim whatever is queued and execute it as one batch.
    ///
    /// An empty queue is a no-op. Executor failures settle every claimed
    /// completion with the error and are returned.
    pub async fn fetch(&self) -> Result<Flush<E::Output>, BatchError> {
        let batch = self.claim();
        self.execute_batch(batch).await
    }

    /// Execute an already claimed batch.
    pub(crate) async fn execute_batch(
        &self,
        batch: Vec<PendingFor<E>>,
    ) -> Result<Flush<E::Output>, BatchError> {
        if batch.is_empty() {
            return Ok(Flush::Empty);
        }

        let size = batch.len();
        let (tasks, settlers): (Vec<E::Task>, Vec<Settler<E::Output>>) =
            batch.into_iter().map(PendingTask::into_parts).unzip();
        let request = BatchRequest {
            bucket: self.id().clone(),
            tasks,
            options: self.options.clone(),
            cache: self.cache.as_ref().map(|cache| cache.read()),
        };

        let span = BatchSpan::new(self.id().as_str(), size);
        let start = Instant::now();
        let outcome = self
            .executor
            .execute(request)
            .instrument(span.clone())
            .await
            .map_err(BatchError::from)
            .and_then(|response| check_result_count(size, response));
        let latency_ms = start.elapsed().as_millis() as u64;
        span.record("latency_ms", latency_ms);
        span.record_outcome(&outcome);

        match outcome {
            Ok(response) => {
                if let (Some(cache), Some(value)) = (&self.cache, response.cache) {
                    cache.replace(value);
                }
                for (settler, result) in settlers.into_iter().zip(&response.results) {
                    settler.settle(Ok(result.clone()));
                }
                telemetry::record_batch_success(self.id().as_str(), size, latency_ms);
                tracing::debug!(bucket = %self.id(), size, latency_ms, "batch completed");
                Ok(Flush::Completed(response.results))
            }
            Err(err) => {
                for settler in settlers {
                    settler.settle(Err(err.clone()));
                }
                telemetry::record_batch_failure(self.id().as_str(), size);
                Err(err)
            }
        }
    }
}

fn check_result_count<O, C>(
    expected: usize,
    response: BatchResponse<O, C>,
) -> Result<BatchResponse<O, C>, BatchError> {
    let actual = response.results.len();
    if actual != expected {
        return Err(BatchError::ResultCountMismatch { expected, actual });
    }
    Ok(response)
}

#[cfg(test)]
#[path = "fetch_tests.rs"]
mod tests;
