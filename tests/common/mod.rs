//! Shared test executor for the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use batch_buckets::{BatchExecutor, BatchRequest, BatchResponse, ExecutorError};

/// One executor invocation as seen by [`Recorder`].
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub bucket: String,
    pub tasks: Vec<u64>,
    pub cache: Option<u64>,
    pub options: serde_json::Value,
}

/// Answers each task with `task * 2` and counts batches in the cache.
///
/// Buckets listed in `failing` get an executor error instead.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_bucket(&self, bucket: &str) {
        self.failing.lock().insert(bucket.to_string());
    }

    pub fn heal_bucket(&self, bucket: &str) {
        self.failing.lock().remove(bucket);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Task lists of every call, in invocation order.
    pub fn batches(&self) -> Vec<Vec<u64>> {
        self.calls.lock().iter().map(|c| c.tasks.clone()).collect()
    }

    pub fn batches_for(&self, bucket: &str) -> Vec<Vec<u64>> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.bucket == bucket)
            .map(|c| c.tasks.clone())
            .collect()
    }
}

#[async_trait]
impl BatchExecutor for Recorder {
    type Task = u64;
    type Output = u64;
    type Cache = u64;

    async fn execute(
        &self,
        batch: BatchRequest<u64, u64>,
    ) -> Result<BatchResponse<u64, u64>, ExecutorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().push(Call {
            bucket: batch.bucket.to_string(),
            tasks: batch.tasks.clone(),
            cache: batch.cache,
            options: serde_json::to_value(&batch.options).unwrap_or_default(),
        });
        if self.failing.lock().contains(batch.bucket.as_str()) {
            return Err(ExecutorError::new(format!("{} is down", batch.bucket)));
        }
        let results = batch.tasks.iter().map(|t| t * 2).collect();
        Ok(BatchResponse::new(results).with_cache(batch.cache.unwrap_or(0) + 1))
    }
}

/// Await `fut`, failing the test if it takes longer than `secs`.
pub async fn within<F: Future>(secs: u64, fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(secs), fut)
        .await
        .expect("timed out")
}
