//! Metrics facade calls.
//!
//! Without an installed recorder these are no-ops.

const TASKS_ENQUEUED: &str = "batch_buckets_tasks_enqueued_total";
const QUEUE_DEPTH: &str = "batch_buckets_queue_depth";
const BATCHES_COMPLETED: &str = "batch_buckets_batches_completed_total";
const BATCHES_FAILED: &str = "batch_buckets_batches_failed_total";
const BATCH_SIZE: &str = "batch_buckets_batch_size";
const BATCH_LATENCY_MS: &str = "batch_buckets_batch_latency_ms";
const TRIGGER_FAILURES: &str = "batch_buckets_trigger_failures_total";

pub fn record_task_enqueued(bucket: &str) {
    ::metrics::counter!(TASKS_ENQUEUED, "bucket" => bucket.to_string()).increment(1);
}

pub fn record_queue_depth(bucket: &str, depth: usize) {
    ::metrics::gauge!(QUEUE_DEPTH, "bucket" => bucket.to_string()).set(depth as f64);
}

pub fn record_batch_success(bucket: &str, size: usize, latency_ms: u64) {
    ::metrics::counter!(BATCHES_COMPLETED, "bucket" => bucket.to_string()).increment(1);
    ::metrics::histogram!(BATCH_SIZE, "bucket" => bucket.to_string()).record(size as f64);
    ::metrics::histogram!(BATCH_LATENCY_MS, "bucket" => bucket.to_string())
        .record(latency_ms as f64);
}

pub fn record_batch_failure(bucket: &str, size: usize) {
    ::metrics::counter!(BATCHES_FAILED, "bucket" => bucket.to_string()).increment(1);
    ::metrics::histogram!(BATCH_SIZE, "bucket" => bucket.to_string()).record(size as f64);
}

pub fn record_trigger_failure(bucket: &str, kind: &'static str) {
    ::metrics::counter!(
        TRIGGER_FAILURES,
        "bucket" => bucket.to_string(),
        "trigger" => kind
    )
    .increment(1);
}
