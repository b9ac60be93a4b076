//! Error types for the batching scheduler.
//!
//! Trigger-driven failures are logged at the trigger boundary; everything here
//! is what callers of `enqueue`, `fetch` and `start` can observe.

use thiserror::Error;

/// Failure reported by a `BatchExecutor`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutorError {
    message: String,
}

impl ExecutorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Outcome of a failed batch, as seen by each completion and by manual fetches.
///
/// Cloned once per task in the batch, so it only carries owned strings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("Executor failed: {0}")]
    Executor(String),

    #[error("Executor returned {actual} results for {expected} tasks")]
    ResultCountMismatch { expected: usize, actual: usize },

    #[error("Task was dropped before its batch completed")]
    Abandoned,
}

impl From<ExecutorError> for BatchError {
    fn from(err: ExecutorError) -> Self {
        Self::Executor(err.message)
    }
}

/// Errors raised while starting a trigger.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("Invalid config for trigger '{kind}': {reason}")]
    InvalidConfig { kind: String, reason: String },
}

/// Errors raised while starting a context or registering a bucket.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("No tokio runtime available; start the context from within a runtime")]
    NoRuntime,

    #[error("Bucket '{bucket}' failed to start: {source}")]
    Trigger {
        bucket: String,
        #[source]
        source: TriggerError,
    },
}

/// Errors from `Context::resolve_after`.
#[derive(Debug, Error)]
pub enum ResolveAfterError<T, E> {
    /// The awaited future failed; nothing was registered.
    #[error("Upstream future failed: {0}")]
    Upstream(E),

    /// The future succeeded but the derived bucket could not be registered.
    /// The resolved value is handed back unchanged.
    #[error("Bucket registration failed: {source}")]
    Register { value: T, source: ContextError },
}

impl<T, E> ResolveAfterError<T, E> {
    /// The upstream value, if the upstream future succeeded.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Upstream(_) => None,
            Self::Register { value, .. } => Some(value),
        }
    }
}

impl BatchError {
    /// Returns true if retrying the same tasks could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Executor(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executor_error_converts_to_batch_error() {
        let err: BatchError = ExecutorError::new("backend down").into();
        assert_eq!(err, BatchError::Executor("backend down".into()));
        assert!(err.to_string().contains("backend down"));
        assert!(err.is_transient());
    }

    #[test]
    fn mismatch_is_not_transient() {
        let err = BatchError::ResultCountMismatch { expected: 3, actual: 2 };
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Executor returned 2 results for 3 tasks");
    }

    #[test]
    fn context_error_names_bucket() {
        let err = ContextError::Trigger {
            bucket: "users".into(),
            source: TriggerError::InvalidConfig {
                kind: "interval".into(),
                reason: "missing 'interval'".into(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("users"));
        assert!(msg.contains("interval"));
    }

    #[test]
    fn register_failure_keeps_upstream_value() {
        let err: ResolveAfterError<u32, String> = ResolveAfterError::Register {
            value: 7,
            source: ContextError::NoRuntime,
        };
        assert!(err.to_string().contains("No tokio runtime"));
        assert_eq!(err.into_value(), Some(7));

        let err: ResolveAfterError<u32, String> = ResolveAfterError::Upstream("down".into());
        assert_eq!(err.into_value(), None);
    }
}
