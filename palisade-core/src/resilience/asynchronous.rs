//! Asynchronous execution of guarded calls.
//!
//! An asynchronous method returns immediately with an [`AsyncHandle`] while
//! the guarded call runs on a worker task. Failures inside the task are
//! delivered through the handle. Only methods declaring a
//! [`ReturnType::Future`] or [`ReturnType::Promise`] contract can be
//! asynchronous; anything else is rejected when the policy is built.

use crate::error::{FaultToleranceError, Result};
use crate::invocation::{MethodSignature, ReturnType};
use crate::resilience::worker::join_error;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::debug;

/// Handle to a guarded call running on a worker task.
///
/// Await it for the result. Dropping the handle does not stop the work; use
/// [`AsyncHandle::cancel`] for that.
pub struct AsyncHandle<T> {
    method: String,
    handle: JoinHandle<Result<T>>,
    // earlier stages of a composed handle
    upstream: Vec<AbortHandle>,
}

impl<T: Send + 'static> AsyncHandle<T> {
    pub(crate) fn spawn<F>(method: String, future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            method,
            handle: tokio::spawn(future),
            upstream: Vec::new(),
        }
    }

    /// Transform the successful result once it is available.
    pub fn map<U, F>(self, f: F) -> AsyncHandle<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.and_then(move |value| async move { Ok(f(value)) })
    }

    /// Chain another asynchronous step after a successful result.
    pub fn and_then<U, F, Fut>(self, f: F) -> AsyncHandle<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<U>> + Send + 'static,
    {
        let mut upstream = self.upstream.clone();
        upstream.push(self.handle.abort_handle());
        let method = self.method.clone();

        let handle = tokio::spawn(async move {
            let value = self.await?;
            f(value).await
        });

        AsyncHandle {
            method,
            handle,
            upstream,
        }
    }
}

impl<T> AsyncHandle<T> {
    /// Cancel the call. Awaiting a cancelled handle yields
    /// [`FaultToleranceError::Cancelled`].
    pub fn cancel(&self) {
        debug!(method = %self.method, "Cancelling asynchronous execution");
        for stage in &self.upstream {
            stage.abort();
        }
        self.handle.abort();
    }

    /// Whether the worker has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T> Future for AsyncHandle<T> {
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

/// Asynchronous execution policy for one guarded method.
#[derive(Debug, Clone)]
pub struct Asynchronous {
    method: MethodSignature,
}

impl Asynchronous {
    /// Validate the method's return contract.
    pub fn new(method: MethodSignature) -> Result<Self> {
        match method.return_type() {
            ReturnType::Future | ReturnType::Promise => Ok(Self { method }),
            ReturnType::Value => Err(FaultToleranceError::definition(format!(
                "{method} is asynchronous but does not return a future or promise"
            ))),
        }
    }

    /// Start `future` on a worker task.
    pub fn spawn<T, F>(&self, future: F) -> AsyncHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        debug!(method = %self.method, "Starting asynchronous execution");
        AsyncHandle::spawn(self.method.to_string(), future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use std::time::Duration;

    fn asynchronous() -> Asynchronous {
        Asynchronous::new(MethodSignature::new("Mailer", "send").returning(ReturnType::Future))
            .unwrap()
    }

    #[test]
    fn test_value_return_type_rejected() {
        let error = Asynchronous::new(MethodSignature::new("Mailer", "send")).unwrap_err();
        assert!(error.is_definition());
        let promise = MethodSignature::new("Mailer", "send").returning(ReturnType::Promise);
        assert!(Asynchronous::new(promise).is_ok());
    }

    #[tokio::test]
    async fn test_handle_returns_before_completion() {
        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let handle = asynchronous().spawn(async move {
            let _ = wait.await;
            Ok(5)
        });

        assert!(!handle.is_finished());
        release.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_failure_delivered_through_handle() {
        let handle: AsyncHandle<u32> =
            asynchronous().spawn(async { Err(Failure::generic("smtp down").into()) });
        assert!(handle.await.unwrap_err().is_failure());
    }

    #[tokio::test]
    async fn test_composition() {
        let handle = asynchronous()
            .spawn(async { Ok(20) })
            .map(|v| v + 1)
            .and_then(|v| async move { Ok(v * 2) });
        assert_eq!(handle.await.unwrap(), 42);

        let failed = asynchronous()
            .spawn(async { Err::<u32, _>(Failure::generic("first").into()) })
            .map(|v| v + 1);
        assert!(failed.await.unwrap_err().is_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let handle = asynchronous()
            .spawn(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(1)
            })
            .map(|v| v * 2);
        handle.cancel();

        let error = handle.await.unwrap_err();
        assert!(matches!(error, FaultToleranceError::Cancelled { .. }));
    }
}
