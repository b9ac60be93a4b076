//! Tests for claim-execute-settle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::*;
use crate::cache::{CacheAdapter, CellCache};
use crate::error::ExecutorError;
use crate::executor::ExecutionOptions;
use crate::scheduler::BucketId;

#[derive(Default)]
struct Recorder {
    batches: Mutex<Vec<Vec<u32>>>,
    seen_cache: Mutex<Vec<Option<Vec<u32>>>>,
    fail: AtomicBool,
    short: AtomicBool,
}

#[async_trait]
impl BatchExecutor for Recorder {
    type Task = u32;
    type Output = u32;
    type Cache = Vec<u32>;

    async fn execute(
        &self,
        batch: BatchRequest<u32, Vec<u32>>,
    ) -> Result<BatchResponse<u32, Vec<u32>>, ExecutorError> {
        self.batches.lock().push(batch.tasks.clone());
        self.seen_cache.lock().push(batch.cache.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ExecutorError::new("backend unavailable"));
        }
        let mut results: Vec<u32> = batch.tasks.iter().map(|t| t * 10).collect();
        if self.short.load(Ordering::SeqCst) {
            results.pop();
        }
        let mut cache = batch.cache.unwrap_or_default();
        cache.extend(&batch.tasks);
        Ok(BatchResponse::new(results).with_cache(cache))
    }
}

fn bucket_with(
    executor: Arc<Recorder>,
    cache: Option<Arc<dyn CacheAdapter<Vec<u32>>>>,
) -> Arc<Bucket<Recorder>> {
    Bucket::new(BucketId::new("test"), ExecutionOptions::new(), cache, executor)
}

#[tokio::test]
async fn fetch_on_empty_queue_skips_executor() {
    let executor = Arc::new(Recorder::default());
    let bucket = bucket_with(executor.clone(), None);

    let flush = bucket.fetch().await.unwrap();
    assert_eq!(flush, Flush::Empty);
    assert!(flush.is_empty());
    assert!(executor.batches.lock().is_empty());
}

#[tokio::test]
async fn fetch_settles_each_completion_with_its_result() {
    let executor = Arc::new(Recorder::default());
    let bucket = bucket_with(executor.clone(), None);

    let c1 = bucket.enqueue(1);
    let c2 = bucket.enqueue(2);
    let c3 = bucket.enqueue(3);

    let flush = bucket.fetch().await.unwrap();
    assert_eq!(flush, Flush::Completed(vec![10, 20, 30]));
    assert_eq!(c1.await, Ok(10));
    assert_eq!(c2.await, Ok(20));
    assert_eq!(c3.await, Ok(30));
    assert_eq!(*executor.batches.lock(), vec![vec![1, 2, 3]]);
    assert_eq!(bucket.queue_len(), 0);
}

#[tokio::test]
async fn second_fetch_after_drain_is_noop() {
    let executor = Arc::new(Recorder::default());
    let bucket = bucket_with(executor.clone(), None);

    let _c = bucket.enqueue(5);
    assert_eq!(bucket.fetch().await.unwrap().len(), 1);
    assert_eq!(bucket.fetch().await.unwrap(), Flush::Empty);
    assert_eq!(executor.batches.lock().len(), 1);
}

#[tokio::test]
async fn executor_failure_reaches_fetcher_and_completions() {
    let executor = Arc::new(Recorder::default());
    executor.fail.store(true, Ordering::SeqCst);
    let bucket = bucket_with(executor.clone(), None);

    let c1 = bucket.enqueue(1);
    let c2 = bucket.enqueue(2);

    let err = bucket.fetch().await.unwrap_err();
    assert_eq!(err, BatchError::Executor("backend unavailable".into()));
    assert_eq!(c1.await, Err(err.clone()));
    assert_eq!(c2.await, Err(err));
}

#[tokio::test]
async fn short_result_list_fails_the_whole_batch() {
    let executor = Arc::new(Recorder::default());
    executor.short.store(true, Ordering::SeqCst);
    let bucket = bucket_with(executor.clone(), None);

    let c1 = bucket.enqueue(1);
    let c2 = bucket.enqueue(2);

    let expected = BatchError::ResultCountMismatch { expected: 2, actual: 1 };
    assert_eq!(bucket.fetch().await.unwrap_err(), expected);
    assert_eq!(c1.await, Err(expected.clone()));
    assert_eq!(c2.await, Err(expected));
}

#[tokio::test]
async fn cache_threads_between_sequential_batches() {
    let executor = Arc::new(Recorder::default());
    let cache = CellCache::<Vec<u32>>::shared();
    let bucket = bucket_with(executor.clone(), Some(cache.clone()));

    let _a = bucket.enqueue(1);
    bucket.fetch().await.unwrap();
    let _b = bucket.enqueue(2);
    bucket.fetch().await.unwrap();

    let seen = executor.seen_cache.lock().clone();
    assert_eq!(seen, vec![Some(vec![]), Some(vec![1])]);
    assert_eq!(cache.read(), vec![1, 2]);
}

#[tokio::test]
async fn failed_batch_leaves_cache_untouched() {
    let executor = Arc::new(Recorder::default());
    let cache: Arc<dyn CacheAdapter<Vec<u32>>> = Arc::new(CellCache::with_value(vec![7]));
    let bucket = bucket_with(executor.clone(), Some(cache.clone()));

    executor.fail.store(true, Ordering::SeqCst);
    let _c = bucket.enqueue(1);
    assert!(bucket.fetch().await.is_err());
    assert_eq!(cache.read(), vec![7]);
}

#[tokio::test]
async fn bucket_without_cache_sends_none() {
    let executor = Arc::new(Recorder::default());
    let bucket = bucket_with(executor.clone(), None);

    let _c = bucket.enqueue(1);
    bucket.fetch().await.unwrap();
    assert_eq!(*executor.seen_cache.lock(), vec![None]);
}

#[tokio::test]
async fn dropped_completion_does_not_break_the_batch() {
    let executor = Arc::new(Recorder::default());
    let bucket = bucket_with(executor.clone(), None);

    drop(bucket.enqueue(1));
    let kept = bucket.enqueue(2);
    assert_eq!(bucket.fetch().await.unwrap(), Flush::Completed(vec![10, 20]));
    assert_eq!(kept.await, Ok(20));
}

#[derive(Default)]
struct DepthGauge(Mutex<Vec<f64>>);

impl ::metrics::GaugeFn for DepthGauge {
    fn increment(&self, _value: f64) {}

    fn decrement(&self, _value: f64) {}

    fn set(&self, value: f64) {
        self.0.lock().push(value);
    }
}

/// Captures `batch_buckets_queue_depth` only.
struct DepthRecorder(Arc<DepthGauge>);

impl ::metrics::Recorder for DepthRecorder {
    fn describe_counter(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}

    fn describe_gauge(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}

    fn describe_histogram(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}

    fn register_counter(&self, _: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Counter {
        ::metrics::Counter::noop()
    }

    fn register_gauge(&self, key: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Gauge {
        if key.name() == "batch_buckets_queue_depth" {
            ::metrics::Gauge::from_arc(Arc::clone(&self.0))
        } else {
            ::metrics::Gauge::noop()
        }
    }

    fn register_histogram(&self, _: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Histogram {
        ::metrics::Histogram::noop()
    }
}

#[test]
fn queue_depth_gauge_drops_to_zero_after_claim() {
    let gauge = Arc::new(DepthGauge::default());
    let recorder = DepthRecorder(Arc::clone(&gauge));
    let bucket = bucket_with(Arc::new(Recorder::default()), None);

    ::metrics::with_local_recorder(&recorder, || {
        let _a = bucket.enqueue(1);
        let _b = bucket.enqueue(2);
        assert_eq!(bucket.claim().len(), 2);
        // Nothing claimed, nothing recorded.
        assert!(bucket.claim_at_least(1).is_none());
        assert!(bucket.claim().is_empty());
        let _c = bucket.enqueue(3);
        assert_eq!(bucket.claim_at_least(1).map(|batch| batch.len()), Some(1));
    });

    assert_eq!(*gauge.0.lock(), vec![1.0, 2.0, 0.0, 1.0, 0.0]);
}
