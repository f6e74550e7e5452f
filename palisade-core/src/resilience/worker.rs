// Spawned worker tasks shared by the bulkhead and timeout layers

use crate::error::{Failure, FaultToleranceError, Result};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::{JoinError, JoinHandle};

/// A guarded call running on its own tokio task.
///
/// The task is aborted when the worker is dropped, so abandoning the caller
/// (for example a cancelled asynchronous handle) also stops the work.
pub(crate) struct Worker<T> {
    method: String,
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> Worker<T> {
    pub(crate) fn spawn<F>(method: String, future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            method,
            handle: tokio::spawn(future),
        }
    }
}

impl<T> Worker<T> {
    /// Signal cancellation. Takes effect at the task's next await point.
    pub(crate) fn abort(&self) {
        self.handle.abort();
    }
}

impl<T> Future for Worker<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.handle).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(error)) => Poll::Ready(Err(join_error(&this.method, error))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for Worker<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Map a failed join to the error seen by the caller.
pub(crate) fn join_error(method: &str, error: JoinError) -> FaultToleranceError {
    if error.is_panic() {
        let payload = error.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "worker panicked".to_string());
        Failure::panicked(message).into()
    } else {
        FaultToleranceError::Cancelled {
            method: method.to_string(),
        }
    }
}
