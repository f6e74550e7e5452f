//! Composition of the policies around one guarded method.
//!
//! [`FaultTolerance`] is built once per guarded method and then invoked for
//! every call. Circuit breakers and bulkheads come from a
//! [`FaultToleranceRegistry`], so every pipeline built for the same method
//! shares their state. Retry, timeout and fallback hold only configuration
//! and statistics and belong to the pipeline.
//!
//! # Examples
//!
//! ```rust,ignore
//! use palisade_core::prelude::*;
//! use std::time::Duration;
//!
//! let orders = FaultTolerance::<Order>::builder(
//!     MethodSignature::new("OrderService", "place").with_parameters(["OrderId"]),
//! )
//! .circuit_breaker(CircuitBreakerConfig::default().request_volume_threshold(4))
//! .retry(RetryConfig::new(2).delay(Duration::from_millis(50)))
//! .timeout(TimeoutConfig::new(Duration::from_millis(500)))
//! .fallback(FallbackConfig::method("placeLater"))
//! .build()?;
//!
//! let order = orders.invoke(invocation).await?;
//! ```

use crate::error::{FaultToleranceError, Result};
use crate::error::Failure;
use crate::interceptor::{GuardedCall, Interceptor, chain, guarded};
use crate::invocation::{FnInvocation, Invocation, InvocationContext, MethodSignature};
use crate::registry::FaultToleranceRegistry;
use crate::resilience::{
    AsyncHandle, Asynchronous, Bulkhead, BulkheadConfig, BulkheadIsolation, BulkheadStats,
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, Fallback, FallbackConfig,
    FallbackRegistry, FallbackStats, Retry, RetryConfig, RetryStats, Timeout, TimeoutConfig,
    TimeoutStats,
};
use crate::settings::FaultToleranceSettings;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Builder for [`FaultTolerance`].
pub struct FaultToleranceBuilder<T> {
    signature: MethodSignature,
    target_type: Option<String>,
    registry: Arc<FaultToleranceRegistry>,
    fallbacks: Arc<FallbackRegistry>,
    settings: FaultToleranceSettings,
    circuit_breaker: Option<CircuitBreakerConfig>,
    bulkhead: Option<BulkheadConfig>,
    retry: Option<RetryConfig>,
    timeout: Option<TimeoutConfig>,
    fallback: Option<FallbackConfig<T>>,
    asynchronous: bool,
}

impl<T: Send + 'static> FaultToleranceBuilder<T> {
    fn new(signature: MethodSignature) -> Self {
        Self {
            signature,
            target_type: None,
            registry: FaultToleranceRegistry::global(),
            fallbacks: FallbackRegistry::global(),
            settings: FaultToleranceSettings::default(),
            circuit_breaker: None,
            bulkhead: None,
            retry: None,
            timeout: None,
            fallback: None,
            asynchronous: false,
        }
    }

    /// Runtime type of the call target, used for fallback method lookup.
    pub fn target_type(mut self, target_type: impl Into<String>) -> Self {
        self.target_type = Some(target_type.into());
        self
    }

    /// Use `registry` instead of the global one for shared state.
    pub fn registry(mut self, registry: Arc<FaultToleranceRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Use `fallbacks` instead of the global fallback method registry.
    pub fn fallback_registry(mut self, fallbacks: Arc<FallbackRegistry>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn settings(mut self, settings: FaultToleranceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    pub fn bulkhead(mut self, config: BulkheadConfig) -> Self {
        self.bulkhead = Some(config);
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    pub fn timeout(mut self, config: TimeoutConfig) -> Self {
        self.timeout = Some(config);
        self
    }

    pub fn fallback(mut self, config: FallbackConfig<T>) -> Self {
        self.fallback = Some(config);
        self
    }

    /// Run calls on a worker task. The method must return a future or promise.
    pub fn asynchronous(mut self) -> Self {
        self.asynchronous = true;
        self
    }

    /// Validate every configuration and resolve shared state.
    ///
    /// All definition errors surface here, never at call time.
    pub fn build(self) -> Result<FaultTolerance<T>> {
        let signature = self.signature;
        let settings = self.settings;

        let asynchronous = if self.asynchronous {
            Some(Asynchronous::new(signature.clone())?)
        } else {
            None
        };

        let mut interceptors: Vec<Arc<dyn Interceptor<T>>> = Vec::new();

        let circuit_breaker = match self.circuit_breaker {
            Some(config) if settings.circuit_breaker_active() => {
                config.validate()?;
                let breaker = self.registry.circuit_breakers().try_get_or_create(&signature, || {
                    CircuitBreaker::new(signature.clone(), config.clone())
                })?;
                if breaker.config() != &config {
                    warn!(
                        method = %signature,
                        "Circuit breaker already configured, keeping existing configuration"
                    );
                }
                interceptors.push(breaker.clone());
                Some(breaker)
            }
            _ => None,
        };

        let bulkhead = match self.bulkhead {
            Some(config) if settings.bulkhead_active() => {
                config.validate()?;
                let isolation = if asynchronous.is_some() {
                    BulkheadIsolation::ThreadPool
                } else {
                    BulkheadIsolation::Semaphore
                };
                let bulkhead = self.registry.bulkheads().try_get_or_create(&signature, || {
                    Bulkhead::new(signature.clone(), config.clone(), isolation)
                })?;
                if bulkhead.config() != &config || bulkhead.isolation() != isolation {
                    warn!(
                        method = %signature,
                        "Bulkhead already configured, keeping existing configuration"
                    );
                }
                interceptors.push(bulkhead.clone());
                Some(bulkhead)
            }
            _ => None,
        };

        let fallback = match self.fallback {
            Some(config) if settings.fallback_active() => {
                let target_type = self
                    .target_type
                    .unwrap_or_else(|| signature.declaring_type().to_string());
                let fallback = Arc::new(Fallback::new(
                    signature.clone(),
                    &target_type,
                    config,
                    &self.fallbacks,
                )?);
                interceptors.push(fallback.clone());
                Some(fallback)
            }
            _ => None,
        };

        let retry = match self.retry {
            Some(config) if settings.retry_active() => {
                let retry = Arc::new(Retry::new(signature.clone(), config)?);
                interceptors.push(retry.clone());
                Some(retry)
            }
            _ => None,
        };

        let timeout = match self.timeout {
            Some(config) if settings.timeout_active() => {
                let timeout = Arc::new(Timeout::new(signature.clone(), config)?);
                interceptors.push(timeout.clone());
                Some(timeout)
            }
            _ => None,
        };

        info!(
            method = %signature,
            circuit_breaker = circuit_breaker.is_some(),
            bulkhead = bulkhead.is_some(),
            fallback = fallback.is_some(),
            retry = retry.is_some(),
            timeout = timeout.is_some(),
            asynchronous = asynchronous.is_some(),
            "Fault tolerance configured"
        );

        Ok(FaultTolerance {
            signature,
            interceptors,
            circuit_breaker,
            bulkhead,
            fallback,
            retry,
            timeout,
            asynchronous,
        })
    }
}

/// The composed policies of one guarded method.
pub struct FaultTolerance<T> {
    signature: MethodSignature,
    interceptors: Vec<Arc<dyn Interceptor<T>>>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    bulkhead: Option<Arc<Bulkhead>>,
    fallback: Option<Arc<Fallback<T>>>,
    retry: Option<Arc<Retry>>,
    timeout: Option<Arc<Timeout>>,
    asynchronous: Option<Asynchronous>,
}

impl<T: Send + 'static> FaultTolerance<T> {
    pub fn builder(signature: MethodSignature) -> FaultToleranceBuilder<T> {
        FaultToleranceBuilder::new(signature)
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    pub fn is_asynchronous(&self) -> bool {
        self.asynchronous.is_some()
    }

    fn prepare<I>(&self, invocation: Arc<I>) -> GuardedCall<T>
    where
        I: Invocation<Output = T>,
    {
        let context = Arc::new(InvocationContext::of(invocation.as_ref()));
        let terminal = guarded(move || {
            let invocation = invocation.clone();
            async move { invocation.proceed().await.map_err(FaultToleranceError::from) }
        });
        chain(&self.interceptors, context, terminal)
    }

    /// Run `invocation` through the policies and wait for the outcome.
    ///
    /// For an asynchronous method this starts the worker and awaits its handle.
    pub async fn invoke<I>(&self, invocation: Arc<I>) -> Result<T>
    where
        I: Invocation<Output = T>,
    {
        if self.asynchronous.is_some() {
            return self.invoke_async(invocation)?.await;
        }
        let call = self.prepare(invocation);
        call().await
    }

    /// Start `invocation` on a worker and return its handle immediately.
    ///
    /// The whole policy chain runs on the worker, so rejections and failures
    /// are delivered through the handle.
    pub fn invoke_async<I>(&self, invocation: Arc<I>) -> Result<AsyncHandle<T>>
    where
        I: Invocation<Output = T>,
    {
        let Some(asynchronous) = &self.asynchronous else {
            return Err(FaultToleranceError::definition(format!(
                "{} is not asynchronous",
                self.signature
            )));
        };
        let call = self.prepare(invocation);
        Ok(asynchronous.spawn(async move { call().await }))
    }

    /// Guard a closure as a call of this pipeline's method.
    pub async fn call<F, Fut>(&self, f: F) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, Failure>> + Send + 'static,
    {
        self.invoke(FnInvocation::new(self.signature.clone(), f).into_arc())
            .await
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    pub fn bulkhead(&self) -> Option<&Arc<Bulkhead>> {
        self.bulkhead.as_ref()
    }

    pub fn retry(&self) -> Option<&Arc<Retry>> {
        self.retry.as_ref()
    }

    pub fn timeout(&self) -> Option<&Arc<Timeout>> {
        self.timeout.as_ref()
    }

    pub fn fallback(&self) -> Option<&Arc<Fallback<T>>> {
        self.fallback.as_ref()
    }

    /// Statistics of every active policy.
    pub fn stats(&self) -> FaultToleranceStats {
        FaultToleranceStats {
            method: self.signature.to_string(),
            circuit_breaker: self.circuit_breaker.as_ref().map(|c| c.stats()),
            bulkhead: self.bulkhead.as_ref().map(|b| b.stats()),
            retry: self.retry.as_ref().map(|r| r.stats()),
            timeout: self.timeout.as_ref().map(|t| t.stats()),
            fallback: self.fallback.as_ref().map(|f| f.stats()),
        }
    }
}

/// Statistics snapshot of a [`FaultTolerance`] pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct FaultToleranceStats {
    pub method: String,
    pub circuit_breaker: Option<CircuitBreakerStats>,
    pub bulkhead: Option<BulkheadStats>,
    pub retry: Option<RetryStats>,
    pub timeout: Option<TimeoutStats>,
    pub fallback: Option<FallbackStats>,
}
