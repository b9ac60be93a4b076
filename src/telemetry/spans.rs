//! Span helpers for batch execution.

use tracing::{info_span, Span};

use crate::error::BatchError;

/// Records batch outcomes onto a span created by [`BatchSpan`].
pub trait SpanExt {
    fn record_outcome<T>(&self, outcome: &Result<T, BatchError>);
}

impl SpanExt for Span {
    fn record_outcome<T>(&self, outcome: &Result<T, BatchError>) {
        let Err(err) = outcome else {
            self.record("status", "ok");
            return;
        };
        self.record("status", "error");
        self.record("error.message", err.to_string().as_str());
        self.record("error.transient", err.is_transient());
    }
}

/// Factory for the span wrapping one executor call.
pub struct BatchSpan;

impl BatchSpan {
    /// `status` and the `error.*` fields are filled by [`SpanExt::record_outcome`];
    /// `latency_ms` once the executor returns.
    pub fn new(bucket: &str, size: usize) -> Span {
        info_span!(
            "batch",
            bucket = %bucket,
            size,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            error.transient = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}
