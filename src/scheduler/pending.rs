//! Pending tasks and the completion handles callers await.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::BatchError;

/// Result delivered to a task's completion.
pub type TaskResult<O> = Result<O, BatchError>;

/// A queued task descriptor plus the sender that settles its completion.
pub struct PendingTask<T, O> {
    pub task: T,
    settle_tx: oneshot::Sender<TaskResult<O>>,
}

impl<T, O> std::fmt::Debug for PendingTask<T, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTask")
            .field("settled", &self.settle_tx.is_closed())
            .finish()
    }
}

impl<T, O> PendingTask<T, O> {
    /// Wrap a task descriptor, returning it with the caller's completion.
    pub fn new(task: T) -> (Self, Completion<O>) {
        let (settle_tx, rx) = oneshot::channel();
        (Self { task, settle_tx }, Completion { rx })
    }

    /// Split into the descriptor and a settle-once handle.
    pub fn into_parts(self) -> (T, Settler<O>) {
        (self.task, Settler { tx: self.settle_tx })
    }
}

/// Settles one completion. Consumed on use, so settlement happens at most once.
pub struct Settler<O> {
    tx: oneshot::Sender<TaskResult<O>>,
}

impl<O> Settler<O> {
    /// Returns false if the caller dropped its completion; that is not an error.
    pub fn settle(self, result: TaskResult<O>) -> bool {
        self.tx.send(result).is_ok()
    }
}

/// Caller-side handle for one enqueued task.
///
/// Resolves once the task's batch completes or fails. Never resolves while the
/// task is still queued. If the task is dropped unsettled (its bucket was
/// replaced and released) it resolves to `BatchError::Abandoned`.
#[must_use = "a completion does nothing unless awaited"]
pub struct Completion<O> {
    rx: oneshot::Receiver<TaskResult<O>>,
}

impl<O> Completion<O> {
    /// Non-blocking check; `None` while the batch has not completed.
    pub fn try_result(&mut self) -> Option<TaskResult<O>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(BatchError::Abandoned)),
        }
    }
}

impl<O> std::fmt::Debug for Completion<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

impl<O> Future for Completion<O> {
    type Output = TaskResult<O>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BatchError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}
