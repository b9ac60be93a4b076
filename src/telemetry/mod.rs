//! Telemetry: structured logging, batch spans and metrics.
//!
//! Best effort only. Nothing here feeds back into scheduling decisions.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_batch_failure, record_batch_success, record_queue_depth, record_task_enqueued,
    record_trigger_failure,
};
pub use spans::{BatchSpan, SpanExt};
