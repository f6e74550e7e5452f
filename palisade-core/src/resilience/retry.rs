//! Retry pattern with delay, jitter and a total duration bound.
//!
//! Every failed attempt is classified with the `retry_on` / `abort_on` lists.
//! A failure on the abort list, or not on the retry list, propagates at once;
//! otherwise the call is repeated up to `max_retries` more times. When a delay
//! is configured each retry waits `delay ± jitter` first.
//!
//! `max_duration` bounds the whole loop, delays included. When it elapses the
//! in-flight attempt is abandoned and the caller sees
//! [`FaultToleranceError::Timeout`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use palisade_core::resilience::{Retry, RetryConfig};
//! use std::time::Duration;
//!
//! let retry = Retry::new(
//!     MethodSignature::new("Ledger", "post"),
//!     RetryConfig::default()
//!         .max_retries(5)
//!         .delay(Duration::from_millis(100))
//!         .jitter(Duration::from_millis(20))
//!         .abort_on(&VALIDATION),
//! )?;
//!
//! let result = retry.call(|| async {
//!     external_service.fetch().await
//! }).await;
//! ```

use crate::error::{FaultToleranceError, Result};
use crate::failure::{FailureFilter, FailureType};
use crate::interceptor::{GuardedCall, Interceptor, Priority};
use crate::invocation::{InvocationContext, MethodSignature};
use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero means the call runs once.
    pub max_retries: u32,
    /// Pause before each retry.
    pub delay: Duration,
    /// Bound of the uniform noise added to `delay`.
    pub jitter: Duration,
    /// Upper bound on the whole loop. `None` means unbounded.
    pub max_duration: Option<Duration>,
    /// Which failures are retried (retry-on / abort-on).
    pub failure_filter: FailureFilter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::ZERO,
            jitter: Duration::from_millis(200),
            max_duration: Some(Duration::from_secs(180)),
            failure_filter: FailureFilter::any(),
        }
    }
}

impl RetryConfig {
    /// Create new retry configuration.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay between attempts.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the jitter bound. Zero disables randomization.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Bound the total time spent in the retry loop.
    pub fn max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    /// Remove the total time bound.
    pub fn unbounded(mut self) -> Self {
        self.max_duration = None;
        self
    }

    /// Retry failures of this type (and subtypes).
    pub fn retry_on(mut self, ty: &'static FailureType) -> Self {
        self.failure_filter = self.failure_filter.apply_on(ty);
        self
    }

    /// Never retry failures of this type (and subtypes).
    pub fn abort_on(mut self, ty: &'static FailureType) -> Self {
        self.failure_filter = self.failure_filter.exclude(ty);
        self
    }

    /// Check the configuration for programmer errors.
    pub fn validate(&self) -> Result<()> {
        if let Some(max_duration) = self.max_duration
            && max_duration <= self.delay
        {
            return Err(FaultToleranceError::definition(format!(
                "retry max_duration ({max_duration:?}) must be greater than delay ({:?})",
                self.delay
            )));
        }
        Ok(())
    }

    /// Delay before the next retry, jitter applied.
    pub fn next_delay(&self) -> Duration {
        if self.delay.is_zero() {
            return Duration::ZERO;
        }
        jittered(self.delay, self.jitter)
    }
}

/// `delay` plus a uniform offset in `[-jitter, +jitter]`, never negative.
fn jittered(delay: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return delay;
    }
    let bound = i64::try_from(jitter.as_nanos()).unwrap_or(i64::MAX);
    let offset = rand::rng().random_range(-bound..=bound);
    let base = i64::try_from(delay.as_nanos()).unwrap_or(i64::MAX);
    let nanos = base.saturating_add(offset).max(0);
    Duration::from_nanos(nanos as u64)
}

/// Result of one attempt after classification.
enum Attempt<T> {
    Succeeded(T),
    Retryable(FaultToleranceError),
    Aborted(FaultToleranceError),
}

/// Retry executor.
pub struct Retry {
    method: MethodSignature,
    config: RetryConfig,
    succeeded_first_try: AtomicU64,
    succeeded_after_retry: AtomicU64,
    failed: AtomicU64,
    total_retries: AtomicU64,
}

impl Retry {
    /// Create a new retry executor.
    pub fn new(method: MethodSignature, config: RetryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            method,
            config,
            succeeded_first_try: AtomicU64::new(0),
            succeeded_after_retry: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_retries: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn classify<T>(&self, result: Result<T>) -> Attempt<T> {
        match result {
            Ok(value) => Attempt::Succeeded(value),
            Err(error) if error.is_definition() => Attempt::Aborted(error),
            Err(error) if self.config.failure_filter.applies(error.failure_type()) => {
                Attempt::Retryable(error)
            }
            Err(error) => Attempt::Aborted(error),
        }
    }

    /// Execute with retry logic.
    pub async fn call<T, F, Fut>(&self, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.config.max_retries == 0 {
            let result = f().await;
            match &result {
                Ok(_) => self.succeeded_first_try.fetch_add(1, Ordering::Relaxed),
                Err(_) => self.failed.fetch_add(1, Ordering::Relaxed),
            };
            return result;
        }

        let Some(limit) = self.config.max_duration else {
            return self.attempts(&mut f).await;
        };

        match tokio::time::timeout(limit, self.attempts(&mut f)).await {
            Ok(result) => result,
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    method = %self.method,
                    max_duration = ?limit,
                    "Retry max duration elapsed"
                );
                Err(FaultToleranceError::Timeout {
                    method: self.method.to_string(),
                    duration: limit,
                })
            }
        }
    }

    async fn attempts<T, F, Fut>(&self, f: &mut F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0u32;

        loop {
            match self.classify(f().await) {
                Attempt::Succeeded(value) => {
                    if retries == 0 {
                        self.succeeded_first_try.fetch_add(1, Ordering::Relaxed);
                    } else {
                        self.succeeded_after_retry.fetch_add(1, Ordering::Relaxed);
                        debug!(method = %self.method, attempt = retries + 1, "Retry succeeded");
                    }
                    return Ok(value);
                }
                Attempt::Aborted(error) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    debug!(method = %self.method, error = %error, "Failure is not retryable");
                    return Err(error);
                }
                Attempt::Retryable(error) => {
                    if retries >= self.config.max_retries {
                        self.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            method = %self.method,
                            attempt = retries + 1,
                            max_retries = self.config.max_retries,
                            error = %error,
                            "Final retry attempt failed"
                        );
                        return Err(error);
                    }

                    retries += 1;
                    self.total_retries.fetch_add(1, Ordering::Relaxed);

                    let delay = self.config.next_delay();
                    debug!(
                        method = %self.method,
                        attempt = retries,
                        delay = ?delay,
                        error = %error,
                        "Retry attempt failed, waiting before retry"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Get retry statistics.
    pub fn stats(&self) -> RetryStats {
        RetryStats {
            method: self.method.to_string(),
            succeeded_first_try: self.succeeded_first_try.load(Ordering::Relaxed),
            succeeded_after_retry: self.succeeded_after_retry.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            total_retries: self.total_retries.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Interceptor<T> for Retry {
    fn priority(&self) -> Priority {
        Priority::Retry
    }

    async fn intercept(&self, _context: Arc<InvocationContext>, next: GuardedCall<T>) -> Result<T> {
        self.call(|| next()).await
    }
}

/// Retry statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RetryStats {
    pub method: String,
    /// Calls that succeeded without retrying.
    pub succeeded_first_try: u64,
    /// Calls that succeeded after at least one retry.
    pub succeeded_after_retry: u64,
    /// Calls that failed in the end.
    pub failed: u64,
    /// Retries performed across all calls.
    pub total_retries: u64,
}
