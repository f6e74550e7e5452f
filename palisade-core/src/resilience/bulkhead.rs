//! Bulkhead pattern for resource isolation.
//!
//! The bulkhead pattern limits concurrent executions of one guarded method,
//! preventing it from consuming all available resources. Saturation never
//! blocks the caller: excess calls fail immediately with
//! [`FaultToleranceError::BulkheadFull`].
//!
//! Two isolation modes exist, fixed per guarded method:
//!
//! - **Semaphore** (default): a counting semaphore sized to `value`; calls run
//!   inline on the caller's task.
//! - **Thread pool** (asynchronous methods): at most `value` calls run on
//!   worker tasks while up to `waiting_task_queue` more wait for a slot.
//!
//! ## Example
//!
//! ```rust,ignore
//! use palisade_core::resilience::{Bulkhead, BulkheadConfig, BulkheadIsolation};
//!
//! let bulkhead = Bulkhead::new(
//!     MethodSignature::new("Reports", "render"),
//!     BulkheadConfig::default().value(4),
//!     BulkheadIsolation::Semaphore,
//! )?;
//!
//! let result = bulkhead.call(|| async {
//!     expensive_operation().await
//! }).await;
//! ```

use crate::error::{FaultToleranceError, Result};
use crate::interceptor::{GuardedCall, Interceptor, Priority};
use crate::invocation::{InvocationContext, MethodSignature};
use crate::resilience::worker::Worker;
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Bulkhead configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkheadConfig {
    /// Maximum concurrent executions.
    pub value: usize,
    /// Calls allowed to wait for a slot (thread pool isolation only).
    pub waiting_task_queue: usize,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            value: 10,
            waiting_task_queue: 10,
        }
    }
}

impl BulkheadConfig {
    /// Create a new configuration.
    pub fn new(value: usize) -> Self {
        Self {
            value,
            ..Default::default()
        }
    }

    /// Set the maximum concurrent executions.
    pub fn value(mut self, value: usize) -> Self {
        self.value = value;
        self
    }

    /// Set the waiting queue size.
    pub fn waiting_task_queue(mut self, size: usize) -> Self {
        self.waiting_task_queue = size;
        self
    }

    /// Check the configuration for programmer errors.
    pub fn validate(&self) -> Result<()> {
        if self.value < 1 {
            return Err(FaultToleranceError::definition(
                "bulkhead value must be at least 1",
            ));
        }
        if self.waiting_task_queue < 1 {
            return Err(FaultToleranceError::definition(
                "bulkhead waiting_task_queue must be at least 1",
            ));
        }
        match self.value.checked_add(self.waiting_task_queue) {
            Some(capacity) if capacity <= Semaphore::MAX_PERMITS => Ok(()),
            _ => Err(FaultToleranceError::definition(format!(
                "bulkhead value plus waiting_task_queue must not exceed {}",
                Semaphore::MAX_PERMITS
            ))),
        }
    }
}

/// How a bulkhead runs admitted calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BulkheadIsolation {
    /// Counting semaphore, call runs on the caller's task.
    Semaphore,
    /// Bounded worker pool with a bounded waiting queue.
    ThreadPool,
}

/// Counter that is decremented when the guard goes away.
struct Gauge(Arc<AtomicUsize>);

impl Gauge {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for Gauge {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bulkhead for limiting concurrent access to one guarded method.
pub struct Bulkhead {
    method: MethodSignature,
    config: BulkheadConfig,
    isolation: BulkheadIsolation,
    executions: Arc<Semaphore>,
    // running + waiting, thread pool isolation only
    capacity: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
    total_accepted: AtomicU64,
    total_rejected: AtomicU64,
}

impl Bulkhead {
    /// Create a new bulkhead.
    pub fn new(
        method: MethodSignature,
        config: BulkheadConfig,
        isolation: BulkheadIsolation,
    ) -> Result<Self> {
        config.validate()?;

        let capacity = match isolation {
            BulkheadIsolation::Semaphore => config.value,
            BulkheadIsolation::ThreadPool => config.value + config.waiting_task_queue,
        };

        info!(
            method = %method,
            value = config.value,
            waiting_task_queue = config.waiting_task_queue,
            isolation = ?isolation,
            "Bulkhead initialized"
        );

        Ok(Self {
            executions: Arc::new(Semaphore::new(config.value)),
            capacity: Arc::new(Semaphore::new(capacity)),
            method,
            config,
            isolation,
            active: Arc::new(AtomicUsize::new(0)),
            queued: Arc::new(AtomicUsize::new(0)),
            total_accepted: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
        })
    }

    /// Guarded method.
    pub fn method(&self) -> &MethodSignature {
        &self.method
    }

    pub fn config(&self) -> &BulkheadConfig {
        &self.config
    }

    pub fn isolation(&self) -> BulkheadIsolation {
        self.isolation
    }

    /// Get current number of active executions.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Get current number of waiting calls.
    pub fn queued_count(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    fn rejected(&self) -> FaultToleranceError {
        self.total_rejected.fetch_add(1, Ordering::Relaxed);
        warn!(
            method = %self.method,
            active = self.active_count(),
            queued = self.queued_count(),
            "Bulkhead full, rejecting call"
        );
        FaultToleranceError::BulkheadFull {
            method: self.method.to_string(),
            max_concurrent: self.config.value,
            queue_size: match self.isolation {
                BulkheadIsolation::Semaphore => 0,
                BulkheadIsolation::ThreadPool => self.config.waiting_task_queue,
            },
        }
    }

    /// Execute inline with semaphore isolation.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _permit = match self.executions.try_acquire() {
            Ok(permit) => permit,
            Err(_) => return Err(self.rejected()),
        };
        self.total_accepted.fetch_add(1, Ordering::Relaxed);

        let _active = Gauge::enter(&self.active);
        debug!(method = %self.method, active = self.active_count(), "Bulkhead admitted call");
        f().await
    }

    /// Execute on a worker task with thread pool isolation.
    ///
    /// Admission is decided immediately; an admitted call may then wait in the
    /// queue until one of the `value` execution slots frees up.
    pub async fn call_isolated<T, Fut>(&self, future: Fut) -> Result<T>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let admission = match self.capacity.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Err(self.rejected()),
        };
        self.total_accepted.fetch_add(1, Ordering::Relaxed);

        let waiting = Gauge::enter(&self.queued);
        let executions = self.executions.clone();
        let active = self.active.clone();
        let method = self.method.to_string();

        let worker = Worker::spawn(method.clone(), async move {
            let _admission = admission;
            let _execution = executions.acquire_owned().await.map_err(|_| {
                FaultToleranceError::Cancelled {
                    method: method.clone(),
                }
            })?;
            drop(waiting);

            let _active = Gauge::enter(&active);
            future.await
        });

        worker.await
    }

    /// Get bulkhead statistics.
    pub fn stats(&self) -> BulkheadStats {
        BulkheadStats {
            method: self.method.to_string(),
            isolation: self.isolation,
            max_concurrent: self.config.value,
            queue_size: self.config.waiting_task_queue,
            active_count: self.active_count(),
            queued_count: self.queued_count(),
            total_accepted: self.total_accepted.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Interceptor<T> for Bulkhead {
    fn priority(&self) -> Priority {
        Priority::Bulkhead
    }

    async fn intercept(&self, _context: Arc<InvocationContext>, next: GuardedCall<T>) -> Result<T> {
        match self.isolation {
            BulkheadIsolation::Semaphore => self.call(|| next()).await,
            BulkheadIsolation::ThreadPool => self.call_isolated(next()).await,
        }
    }
}

/// Bulkhead statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BulkheadStats {
    /// Guarded method.
    pub method: String,
    /// Isolation mode.
    pub isolation: BulkheadIsolation,
    /// Maximum concurrent executions.
    pub max_concurrent: usize,
    /// Waiting queue size.
    pub queue_size: usize,
    /// Current active executions.
    pub active_count: usize,
    /// Current waiting calls.
    pub queued_count: usize,
    /// Total admitted calls.
    pub total_accepted: u64,
    /// Total rejected calls.
    pub total_rejected: u64,
}

impl BulkheadStats {
    /// Calculate utilization (0.0 - 1.0).
    pub fn utilization(&self) -> f64 {
        self.active_count as f64 / self.max_concurrent as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn bulkhead(value: usize, queue: usize, isolation: BulkheadIsolation) -> Arc<Bulkhead> {
        Arc::new(
            Bulkhead::new(
                MethodSignature::new("Reports", "render"),
                BulkheadConfig::new(value).waiting_task_queue(queue),
                isolation,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_bulkhead_allows_call() {
        let bulkhead = bulkhead(2, 1, BulkheadIsolation::Semaphore);
        let result: Result<i32> = bulkhead.call(|| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(bulkhead.active_count(), 0);
    }

    #[tokio::test]
    async fn test_semaphore_rejects_when_full() {
        let bulkhead = bulkhead(1, 1, BulkheadIsolation::Semaphore);
        let (release, wait) = oneshot::channel::<()>();

        let holder = {
            let bulkhead = bulkhead.clone();
            tokio::spawn(async move {
                bulkhead
                    .call(|| async move {
                        let _ = wait.await;
                        Ok(1)
                    })
                    .await
            })
        };
        while bulkhead.active_count() == 0 {
            tokio::task::yield_now().await;
        }

        let invoked = std::sync::atomic::AtomicBool::new(false);
        let result: Result<i32> = bulkhead
            .call(|| async {
                invoked.store(true, Ordering::SeqCst);
                Ok(2)
            })
            .await;
        let error = result.unwrap_err();
        assert!(error.is_bulkhead_full());
        assert!(!invoked.load(Ordering::SeqCst));

        release.send(()).unwrap();
        assert_eq!(holder.await.unwrap().unwrap(), 1);

        // the permit was released on exit
        let result: Result<i32> = bulkhead.call(|| async { Ok(3) }).await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(bulkhead.stats().total_rejected, 1);
    }

    #[tokio::test]
    async fn test_permit_released_on_failure() {
        let bulkhead = bulkhead(1, 1, BulkheadIsolation::Semaphore);
        let failed: Result<i32> = bulkhead
            .call(|| async { Err(Failure::generic("boom").into()) })
            .await;
        assert!(failed.unwrap_err().is_failure());

        let ok: Result<i32> = bulkhead.call(|| async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_thread_pool_queues_then_rejects() {
        let bulkhead = bulkhead(1, 1, BulkheadIsolation::ThreadPool);

        let spawn_slow = |bulkhead: Arc<Bulkhead>| {
            tokio::spawn(async move {
                bulkhead
                    .call_isolated(async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(1)
                    })
                    .await
            })
        };

        let running = spawn_slow(bulkhead.clone());
        let waiting = spawn_slow(bulkhead.clone());
        while bulkhead.active_count() + bulkhead.queued_count() < 2 {
            tokio::task::yield_now().await;
        }

        let rejected = bulkhead.call_isolated(async { Ok(3) }).await;
        assert!(rejected.unwrap_err().is_bulkhead_full());

        assert_eq!(running.await.unwrap().unwrap(), 1);
        assert_eq!(waiting.await.unwrap().unwrap(), 1);

        let stats = bulkhead.stats();
        assert_eq!(stats.total_accepted, 2);
        assert_eq!(stats.total_rejected, 1);
        assert_eq!(stats.active_count, 0);
        assert_eq!(stats.queued_count, 0);
    }

    #[tokio::test]
    async fn test_thread_pool_panic_is_failure() {
        let bulkhead = bulkhead(1, 1, BulkheadIsolation::ThreadPool);
        let input: Option<u32> = None;
        let result = bulkhead
            .call_isolated(async move { Ok(input.expect("bad input")) })
            .await;
        assert!(result.unwrap_err().is_failure());
        assert_eq!(bulkhead.active_count(), 0);
    }

    #[test]
    fn test_invalid_config() {
        let err = Bulkhead::new(
            MethodSignature::new("Svc", "op"),
            BulkheadConfig::new(0),
            BulkheadIsolation::Semaphore,
        )
        .err()
        .unwrap();
        assert!(err.is_definition());
    }

    #[test]
    fn test_oversized_config_is_rejected() {
        let sig = MethodSignature::new("Svc", "op");

        let err = Bulkhead::new(
            sig.clone(),
            BulkheadConfig::new(1 << 62),
            BulkheadIsolation::Semaphore,
        )
        .err()
        .unwrap();
        assert!(err.is_definition());

        let err = Bulkhead::new(
            sig,
            BulkheadConfig::new(usize::MAX).waiting_task_queue(1),
            BulkheadIsolation::ThreadPool,
        )
        .err()
        .unwrap();
        assert!(err.is_definition());
    }
}
