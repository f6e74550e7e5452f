// Interceptors wrapping a guarded call

use crate::error::Result;
use crate::invocation::InvocationContext;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// Future returned by one execution of a guarded call.
pub type CallFuture<T> = BoxFuture<'static, Result<T>>;

/// A re-invocable guarded call. Retries call it more than once.
pub type GuardedCall<T> = Arc<dyn Fn() -> CallFuture<T> + Send + Sync>;

/// Wrap a closure as a [`GuardedCall`].
pub fn guarded<T, F, Fut>(f: F) -> GuardedCall<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<T>> + Send + 'static,
{
    Arc::new(move || -> CallFuture<T> { Box::pin(f()) })
}

/// Position of a layer in the chain, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    CircuitBreaker,
    Bulkhead,
    Fallback,
    Retry,
    Timeout,
}

/// A policy layer around a guarded call
#[async_trait]
pub trait Interceptor<T>: Send + Sync {
    /// Where this layer sits in the chain.
    fn priority(&self) -> Priority;

    /// Run `next`, possibly several times or not at all.
    async fn intercept(&self, context: Arc<InvocationContext>, next: GuardedCall<T>) -> Result<T>;
}

/// Compose interceptors around `terminal`, ordered by [`Priority`].
pub fn chain<T>(
    interceptors: &[Arc<dyn Interceptor<T>>],
    context: Arc<InvocationContext>,
    terminal: GuardedCall<T>,
) -> GuardedCall<T>
where
    T: Send + 'static,
{
    let mut ordered: Vec<_> = interceptors.to_vec();
    ordered.sort_by_key(|i| i.priority());

    ordered.into_iter().rev().fold(terminal, |next, interceptor| {
        let context = context.clone();
        let wrapped: GuardedCall<T> = Arc::new(move || -> CallFuture<T> {
            let interceptor = interceptor.clone();
            let context = context.clone();
            let next = next.clone();
            Box::pin(async move { interceptor.intercept(context, next).await })
        });
        wrapped
    })
}
