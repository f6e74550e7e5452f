//! Fallback pattern for graceful degradation.
//!
//! When the guarded call fails with an applicable failure (`apply_on`, not
//! `skip_on`), the fallback's result becomes the call's result. Failures
//! raised by the fallback itself propagate to the caller untouched.
//!
//! Two mutually exclusive strategies exist:
//!
//! - a **named fallback method**, registered in a [`FallbackRegistry`] with
//!   the same parameter types as the guarded method and resolved when the
//!   policy is built: first on the declaring type, then on the runtime target
//!   type;
//! - a **handler** implementing [`FallbackHandler`], which receives an
//!   [`ExecutionContext`] with the method, the original arguments and the
//!   captured failure.
//!
//! ## Example
//!
//! ```rust,ignore
//! use palisade_core::resilience::{FallbackConfig, FallbackRegistry};
//!
//! let registry = FallbackRegistry::global();
//! registry.register(
//!     MethodSignature::new("Catalog", "cachedPrice").with_parameters(["Sku"]),
//!     |args| async move { Ok(price_cache.get(&args[0])) },
//! );
//!
//! let config = FallbackConfig::method("cachedPrice").skip_on(&VALIDATION);
//! ```

use crate::error::{FaultToleranceError, Result};
use crate::failure::{FailureFilter, FailureType};
use crate::interceptor::{CallFuture, GuardedCall, Interceptor, Priority};
use crate::invocation::{InvocationContext, MethodSignature};
use async_trait::async_trait;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// A fallback method: receives the original call arguments.
pub type FallbackMethod<T> = Arc<dyn Fn(Vec<Value>) -> CallFuture<T> + Send + Sync>;

/// What a [`FallbackHandler`] gets to see about the failed call.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    method: MethodSignature,
    parameters: Vec<Value>,
    failure: FaultToleranceError,
}

impl ExecutionContext {
    pub fn new(
        method: MethodSignature,
        parameters: Vec<Value>,
        failure: FaultToleranceError,
    ) -> Self {
        Self {
            method,
            parameters,
            failure,
        }
    }

    /// The guarded method.
    pub fn method(&self) -> &MethodSignature {
        &self.method
    }

    /// Arguments of the failed call.
    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    /// The failure that triggered the fallback.
    pub fn failure(&self) -> &FaultToleranceError {
        &self.failure
    }
}

/// Supplies a substitute result for a failed call.
#[async_trait]
pub trait FallbackHandler<T>: Send + Sync {
    async fn handle(&self, context: &ExecutionContext) -> Result<T>;
}

/// A [`FallbackHandler`] backed by a closure.
pub struct FnHandler<F> {
    f: F,
}

/// Create a handler from a closure.
pub fn handler_fn<T, F, Fut>(f: F) -> Arc<dyn FallbackHandler<T>>
where
    T: Send + 'static,
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

#[async_trait]
impl<T, F, Fut> FallbackHandler<T> for FnHandler<F>
where
    T: Send + 'static,
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    async fn handle(&self, context: &ExecutionContext) -> Result<T> {
        (self.f)(context.clone()).await
    }
}

static GLOBAL: Lazy<Arc<FallbackRegistry>> = Lazy::new(|| Arc::new(FallbackRegistry::new()));

/// Dispatch table of named fallback methods, keyed by signature.
#[derive(Default)]
pub struct FallbackRegistry {
    methods: DashMap<MethodSignature, Arc<dyn Any + Send + Sync>>,
}

impl FallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<Self> {
        GLOBAL.clone()
    }

    /// Register `f` as the method `signature`. Replaces an earlier entry.
    pub fn register<T, F, Fut>(&self, signature: MethodSignature, f: F)
    where
        T: Send + 'static,
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let method: FallbackMethod<T> =
            Arc::new(move |args| -> CallFuture<T> { Box::pin(f(args)) });
        self.methods.insert(signature, Arc::new(method));
    }

    pub fn contains(&self, signature: &MethodSignature) -> bool {
        self.methods.contains_key(signature)
    }

    /// Look up a method returning `T`.
    ///
    /// `Err` means an entry exists but returns a different type.
    fn lookup<T: 'static>(&self, signature: &MethodSignature) -> Option<Result<FallbackMethod<T>>> {
        let entry = self.methods.get(signature)?;
        Some(
            entry
                .downcast_ref::<FallbackMethod<T>>()
                .cloned()
                .ok_or_else(|| {
                    FaultToleranceError::definition(format!(
                        "fallback method {signature} has a different return type"
                    ))
                }),
        )
    }

    /// Resolve fallback method `name` for `method`, searching the declaring
    /// type first and then `target_type`.
    pub fn resolve<T: 'static>(
        &self,
        method: &MethodSignature,
        target_type: &str,
        name: &str,
    ) -> Result<FallbackMethod<T>> {
        let declared = method.renamed(name);
        if let Some(found) = self.lookup(&declared) {
            return found;
        }

        let on_target = declared.on_type(target_type);
        if let Some(found) = self.lookup(&on_target) {
            return found;
        }

        Err(FaultToleranceError::definition(format!(
            "fallback method {name} not found for {method} on {} or {target_type}",
            method.declaring_type()
        )))
    }
}

/// How the substitute result is produced.
pub enum FallbackStrategy<T> {
    /// Named method resolved through a [`FallbackRegistry`].
    Method(String),
    /// Handler invoked with the execution context.
    Handler(Arc<dyn FallbackHandler<T>>),
}

impl<T> Clone for FallbackStrategy<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Method(name) => Self::Method(name.clone()),
            Self::Handler(handler) => Self::Handler(handler.clone()),
        }
    }
}

impl<T> std::fmt::Debug for FallbackStrategy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Method(name) => f.debug_tuple("Method").field(name).finish(),
            Self::Handler(_) => f.write_str("Handler"),
        }
    }
}

/// Fallback configuration.
pub struct FallbackConfig<T> {
    pub strategy: FallbackStrategy<T>,
    /// Which failures trigger the fallback (apply-on / skip-on).
    pub failure_filter: FailureFilter,
}

impl<T> Clone for FallbackConfig<T> {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy.clone(),
            failure_filter: self.failure_filter.clone(),
        }
    }
}

impl<T> std::fmt::Debug for FallbackConfig<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackConfig")
            .field("strategy", &self.strategy)
            .field("failure_filter", &self.failure_filter)
            .finish()
    }
}

impl<T> FallbackConfig<T> {
    /// Fall back to a named method.
    pub fn method(name: impl Into<String>) -> Self {
        Self {
            strategy: FallbackStrategy::Method(name.into()),
            failure_filter: FailureFilter::any(),
        }
    }

    /// Fall back to a handler.
    pub fn handler(handler: Arc<dyn FallbackHandler<T>>) -> Self {
        Self {
            strategy: FallbackStrategy::Handler(handler),
            failure_filter: FailureFilter::any(),
        }
    }

    /// Only fall back on failures of this type (and subtypes).
    pub fn apply_on(mut self, ty: &'static FailureType) -> Self {
        self.failure_filter = self.failure_filter.apply_on(ty);
        self
    }

    /// Never fall back on failures of this type (and subtypes).
    pub fn skip_on(mut self, ty: &'static FailureType) -> Self {
        self.failure_filter = self.failure_filter.exclude(ty);
        self
    }
}

enum Target<T> {
    Method(FallbackMethod<T>),
    Handler(Arc<dyn FallbackHandler<T>>),
}

/// Fallback policy for one guarded method.
pub struct Fallback<T> {
    method: MethodSignature,
    target: Target<T>,
    failure_filter: FailureFilter,
    calls: AtomicU64,
    applied: AtomicU64,
}

impl<T: Send + 'static> Fallback<T> {
    /// Create the policy, resolving a named method eagerly.
    pub fn new(
        method: MethodSignature,
        target_type: &str,
        config: FallbackConfig<T>,
        registry: &FallbackRegistry,
    ) -> Result<Self> {
        let target = match config.strategy {
            FallbackStrategy::Method(name) => {
                Target::Method(registry.resolve(&method, target_type, &name)?)
            }
            FallbackStrategy::Handler(handler) => Target::Handler(handler),
        };

        Ok(Self {
            method,
            target,
            failure_filter: config.failure_filter,
            calls: AtomicU64::new(0),
            applied: AtomicU64::new(0),
        })
    }

    /// Execute `f`, substituting the fallback result on applicable failures.
    pub async fn call<F, Fut>(&self, context: &InvocationContext, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let failure = match f().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_definition() => return Err(error),
            Err(error) if !self.failure_filter.applies(error.failure_type()) => return Err(error),
            Err(error) => error,
        };

        self.applied.fetch_add(1, Ordering::Relaxed);
        debug!(
            method = %self.method,
            failure = %failure,
            "Primary operation failed, using fallback"
        );

        match &self.target {
            Target::Method(method) => method(context.parameters().to_vec()).await,
            Target::Handler(handler) => {
                let execution = ExecutionContext::new(
                    context.signature().clone(),
                    context.parameters().to_vec(),
                    failure,
                );
                handler.handle(&execution).await
            }
        }
    }

    /// Get fallback statistics.
    pub fn stats(&self) -> FallbackStats {
        FallbackStats {
            method: self.method.to_string(),
            calls: self.calls.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Interceptor<T> for Fallback<T> {
    fn priority(&self) -> Priority {
        Priority::Fallback
    }

    async fn intercept(&self, context: Arc<InvocationContext>, next: GuardedCall<T>) -> Result<T> {
        self.call(&context, || next()).await
    }
}

/// Fallback statistics.
#[derive(Debug, Clone, Serialize)]
pub struct FallbackStats {
    pub method: String,
    pub calls: u64,
    /// Calls answered by the fallback.
    pub applied: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use crate::failure::FAILURE;
    use serde_json::json;

    static REMOTE: FailureType = FailureType::extends("RemoteFailure", &FAILURE);
    static INVALID: FailureType = FailureType::extends("InvalidInput", &FAILURE);

    fn signature() -> MethodSignature {
        MethodSignature::new("Catalog", "price").with_parameters(["Sku"])
    }

    fn context() -> InvocationContext {
        InvocationContext::new(signature(), vec![json!("sku-1")], "CatalogImpl".into())
    }

    fn failing(ty: &'static FailureType) -> impl FnOnce() -> std::future::Ready<Result<u32>> {
        move || std::future::ready(Err(Failure::new(ty, "down").into()))
    }

    #[tokio::test]
    async fn test_handler_receives_context() {
        let handler = handler_fn(|ctx: ExecutionContext| async move {
            assert_eq!(ctx.parameters()[0], json!("sku-1"));
            assert!(std::ptr::eq(ctx.failure().failure_type(), &REMOTE));
            Ok(7)
        });
        let fallback = Fallback::new(
            signature(),
            "CatalogImpl",
            FallbackConfig::handler(handler),
            &FallbackRegistry::new(),
        )
        .unwrap();

        let result = fallback.call(&context(), failing(&REMOTE)).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(fallback.stats().applied, 1);
    }

    #[tokio::test]
    async fn test_success_skips_fallback() {
        let fallback = Fallback::new(
            signature(),
            "CatalogImpl",
            FallbackConfig::handler(handler_fn(|_| async { Ok(0) })),
            &FallbackRegistry::new(),
        )
        .unwrap();

        let result = fallback.call(&context(), || async { Ok(3) }).await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(fallback.stats().applied, 0);
    }

    #[tokio::test]
    async fn test_skip_on_propagates_original() {
        let fallback = Fallback::new(
            signature(),
            "CatalogImpl",
            FallbackConfig::handler(handler_fn(|_| async { Ok(0) }))
                .apply_on(&FAILURE)
                .skip_on(&INVALID),
            &FallbackRegistry::new(),
        )
        .unwrap();

        let error = fallback.call(&context(), failing(&INVALID)).await.unwrap_err();
        assert!(std::ptr::eq(error.failure_type(), &INVALID));
        assert_eq!(fallback.stats().applied, 0);

        assert_eq!(fallback.call(&context(), failing(&REMOTE)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_method_resolved_on_declaring_then_target_type() {
        let registry = FallbackRegistry::new();
        registry.register(
            signature().renamed("cachedPrice").on_type("CatalogImpl"),
            |args| async move {
                assert_eq!(args, vec![json!("sku-1")]);
                Ok(99u32)
            },
        );

        let fallback = Fallback::new(
            signature(),
            "CatalogImpl",
            FallbackConfig::method("cachedPrice"),
            &registry,
        )
        .unwrap();
        assert_eq!(fallback.call(&context(), failing(&REMOTE)).await.unwrap(), 99);

        registry.register(signature().renamed("cachedPrice"), |_| async { Ok(1u32) });
        let declared = Fallback::new(
            signature(),
            "CatalogImpl",
            FallbackConfig::method("cachedPrice"),
            &registry,
        )
        .unwrap();
        assert_eq!(declared.call(&context(), failing(&REMOTE)).await.unwrap(), 1);
    }

    #[test]
    fn test_missing_method_is_definition_error() {
        let result = Fallback::<u32>::new(
            signature(),
            "CatalogImpl",
            FallbackConfig::method("nope"),
            &FallbackRegistry::new(),
        );
        assert!(result.err().unwrap().is_definition());
    }

    #[test]
    fn test_wrong_return_type_is_definition_error() {
        let registry = FallbackRegistry::new();
        registry.register(signature().renamed("cachedPrice"), |_| async { Ok("text".to_string()) });

        let result = Fallback::<u32>::new(
            signature(),
            "CatalogImpl",
            FallbackConfig::method("cachedPrice"),
            &registry,
        );
        assert!(result.err().unwrap().is_definition());
    }

    #[tokio::test]
    async fn test_fallback_failure_propagates() {
        let fallback = Fallback::new(
            signature(),
            "CatalogImpl",
            FallbackConfig::handler(handler_fn(|_| async {
                Err(Failure::new(&INVALID, "fallback broke").into())
            })),
            &FallbackRegistry::new(),
        )
        .unwrap();

        let error: FaultToleranceError = fallback
            .call(&context(), failing(&REMOTE))
            .await
            .unwrap_err();
        assert!(std::ptr::eq(error.failure_type(), &INVALID));
    }

    #[tokio::test]
    async fn test_definition_errors_never_fall_back() {
        let fallback = Fallback::new(
            signature(),
            "CatalogImpl",
            FallbackConfig::handler(handler_fn(|_| async { Ok(0u32) })),
            &FallbackRegistry::new(),
        )
        .unwrap();

        let result = fallback
            .call(&context(), || async { Err(FaultToleranceError::definition("bad")) })
            .await;
        assert!(result.unwrap_err().is_definition());
    }
}
