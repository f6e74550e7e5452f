//! Timeout pattern for guarded calls.
//!
//! The guarded call runs on a worker task while the caller waits for at most
//! the configured duration. On expiry the caller gets
//! [`FaultToleranceError::Timeout`] and the worker is aborted at its next
//! await point.
//!
//! ## Example
//!
//! ```rust,ignore
//! use palisade_core::resilience::{Timeout, TimeoutConfig};
//! use std::time::Duration;
//!
//! let timeout = Timeout::new(
//!     MethodSignature::new("Search", "query"),
//!     TimeoutConfig::new(Duration::from_millis(250)),
//! )?;
//!
//! let result = timeout.call(slow_operation()).await;
//! ```

use crate::error::{FaultToleranceError, Result};
use crate::interceptor::{GuardedCall, Interceptor, Priority};
use crate::invocation::{InvocationContext, MethodSignature};
use crate::resilience::worker::Worker;
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// Timeout configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Timeout duration.
    pub value: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            value: Duration::from_secs(1),
        }
    }
}

impl TimeoutConfig {
    /// Create a new timeout configuration.
    pub fn new(value: Duration) -> Self {
        Self { value }
    }

    pub fn validate(&self) -> Result<()> {
        if self.value.is_zero() {
            return Err(FaultToleranceError::definition(
                "timeout value must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Timeout executor for one guarded method.
pub struct Timeout {
    method: MethodSignature,
    config: TimeoutConfig,
    completed: AtomicU64,
    timed_out: AtomicU64,
}

impl Timeout {
    /// Create a new timeout executor.
    pub fn new(method: MethodSignature, config: TimeoutConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            method,
            config,
            completed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
        })
    }

    /// Get the timeout duration.
    pub fn duration(&self) -> Duration {
        self.config.value
    }

    /// Execute with timeout.
    ///
    /// Completion before the deadline returns the call's result unchanged,
    /// failures included.
    pub async fn call<T, Fut>(&self, future: Fut) -> Result<T>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut worker = Worker::spawn(self.method.to_string(), future);

        match tokio::time::timeout(self.config.value, &mut worker).await {
            Ok(result) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                result
            }
            Err(_) => {
                worker.abort();
                self.timed_out.fetch_add(1, Ordering::Relaxed);
                warn!(
                    method = %self.method,
                    duration = ?self.config.value,
                    "Operation timed out"
                );
                Err(FaultToleranceError::Timeout {
                    method: self.method.to_string(),
                    duration: self.config.value,
                })
            }
        }
    }

    /// Get timeout statistics.
    pub fn stats(&self) -> TimeoutStats {
        TimeoutStats {
            method: self.method.to_string(),
            duration: self.config.value,
            completed: self.completed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Interceptor<T> for Timeout {
    fn priority(&self) -> Priority {
        Priority::Timeout
    }

    async fn intercept(&self, _context: Arc<InvocationContext>, next: GuardedCall<T>) -> Result<T> {
        self.call(next()).await
    }
}

/// Timeout statistics.
#[derive(Debug, Clone, Serialize)]
pub struct TimeoutStats {
    pub method: String,
    pub duration: Duration,
    /// Calls that finished before the deadline.
    pub completed: u64,
    /// Calls that were cut off.
    pub timed_out: u64,
}
