//! Circuit Breaker pattern implementation.
//!
//! The circuit breaker keeps a window of recorded outcomes per guarded method
//! and stops calling the method once the failure ratio of a full window reaches
//! the configured threshold.
//!
//! ## States
//!
//! - **Closed**: calls pass through, outcomes are counted
//! - **Open**: calls are rejected without running the guarded call
//! - **Half-Open**: a limited number of trial calls probe for recovery
//!
//! Transitions are evaluated at the start of every call, before admission:
//!
//! - Closed → Open when a window of `request_volume_threshold` requests has a
//!   failure ratio of at least `failure_ratio`
//! - Closed → Closed when a full window stays below the ratio; counters roll over
//! - Open → Half-Open once `delay` has elapsed since opening
//! - Half-Open → Closed after `success_threshold` successful trials
//! - Half-Open → Open as soon as a trial fails
//!
//! ## Example
//!
//! ```rust,ignore
//! use palisade_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let circuit = CircuitBreaker::new(
//!     MethodSignature::new("Inventory", "reserve"),
//!     CircuitBreakerConfig::default()
//!         .request_volume_threshold(4)
//!         .failure_ratio(0.5)
//!         .delay(Duration::from_secs(10)),
//! )?;
//!
//! match circuit.call(|| async { inventory.reserve(item).await }).await {
//!     Ok(reservation) => Ok(reservation),
//!     Err(FaultToleranceError::CircuitOpen { .. }) => Err(unavailable()),
//!     Err(other) => Err(other),
//! }
//! ```

use crate::error::{FaultToleranceError, Result};
use crate::failure::{FailureFilter, FailureType};
use crate::interceptor::{GuardedCall, Interceptor, Priority};
use crate::invocation::{InvocationContext, MethodSignature};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally.
    Closed = 0,
    /// Circuit is open, requests are rejected.
    Open = 1,
    /// Circuit is half-open, testing recovery.
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Time the circuit stays open before allowing trial calls.
    pub delay: Duration,
    /// Number of requests in one window.
    pub request_volume_threshold: u32,
    /// Failure ratio of a full window that opens the circuit.
    pub failure_ratio: f64,
    /// Successful trials needed to close a half-open circuit.
    pub success_threshold: u32,
    /// Which failures count as failures (fail-on / skip-on).
    pub failure_filter: FailureFilter,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            request_volume_threshold: 20,
            failure_ratio: 0.5,
            success_threshold: 1,
            failure_filter: FailureFilter::any(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the open delay.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the window size.
    pub fn request_volume_threshold(mut self, threshold: u32) -> Self {
        self.request_volume_threshold = threshold;
        self
    }

    /// Set the failure ratio.
    pub fn failure_ratio(mut self, ratio: f64) -> Self {
        self.failure_ratio = ratio;
        self
    }

    /// Set the success threshold for recovery.
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Count failures of this type (and subtypes).
    pub fn fail_on(mut self, ty: &'static FailureType) -> Self {
        self.failure_filter = self.failure_filter.apply_on(ty);
        self
    }

    /// Treat failures of this type (and subtypes) as successes.
    pub fn skip_on(mut self, ty: &'static FailureType) -> Self {
        self.failure_filter = self.failure_filter.exclude(ty);
        self
    }

    /// Check the configuration for programmer errors.
    pub fn validate(&self) -> Result<()> {
        if self.request_volume_threshold < 1 {
            return Err(FaultToleranceError::definition(
                "circuit breaker request_volume_threshold must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.failure_ratio) {
            return Err(FaultToleranceError::definition(format!(
                "circuit breaker failure_ratio must be within [0, 1], got {}",
                self.failure_ratio
            )));
        }
        if self.success_threshold < 1 {
            return Err(FaultToleranceError::definition(
                "circuit breaker success_threshold must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Classified outcome of one admitted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Ignored,
}

/// Circuit breaker protecting one guarded method.
pub struct CircuitBreaker {
    method: MethodSignature,
    config: CircuitBreakerConfig,
    status: AtomicU8,
    // window counters, frozen while open
    requests: AtomicU64,
    failures: AtomicU64,
    // half-open trial counters
    trials_admitted: AtomicU64,
    trial_successes: AtomicU64,
    trial_failures: AtomicU64,
    created_at: Instant,
    opened_at_nanos: AtomicU64,
    transition: Mutex<()>,
    total_requests: AtomicU64,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
    times_opened: AtomicU64,
}

impl CircuitBreaker {
    /// Create a circuit breaker for `method`.
    pub fn new(method: MethodSignature, config: CircuitBreakerConfig) -> Result<Self> {
        config.validate()?;

        info!(
            method = %method,
            request_volume_threshold = config.request_volume_threshold,
            failure_ratio = config.failure_ratio,
            delay = ?config.delay,
            "Circuit breaker initialized"
        );

        Ok(Self {
            method,
            config,
            status: AtomicU8::new(CircuitState::Closed as u8),
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            trials_admitted: AtomicU64::new(0),
            trial_successes: AtomicU64::new(0),
            trial_failures: AtomicU64::new(0),
            created_at: Instant::now(),
            opened_at_nanos: AtomicU64::new(0),
            transition: Mutex::new(()),
            total_requests: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
            times_opened: AtomicU64::new(0),
        })
    }

    /// Guarded method.
    pub fn method(&self) -> &MethodSignature {
        &self.method
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Evaluate pending transitions and return the resulting state.
    pub fn state(&self) -> CircuitState {
        self.evaluate()
    }

    fn load_state(&self) -> CircuitState {
        CircuitState::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn now_nanos(&self) -> u64 {
        Instant::now()
            .saturating_duration_since(self.created_at)
            .as_nanos()
            .min(u64::MAX as u128) as u64
    }

    /// Single evaluation step. Every status change happens here or in the
    /// manual controls, always under the transition lock.
    fn evaluate(&self) -> CircuitState {
        let _guard = self.transition.lock();

        match self.load_state() {
            CircuitState::Closed => {
                let requests = self.requests.load(Ordering::SeqCst);
                if requests == 0 || requests < u64::from(self.config.request_volume_threshold) {
                    return CircuitState::Closed;
                }

                let failures = self.failures.load(Ordering::SeqCst);
                let ratio = failures as f64 / requests as f64;
                if !(ratio < self.config.failure_ratio) {
                    self.open(ratio);
                    return CircuitState::Open;
                }

                debug!(
                    method = %self.method,
                    requests,
                    failures,
                    "Circuit breaker window rolled over"
                );
                self.reset_window();
                CircuitState::Closed
            }
            CircuitState::Open => {
                let opened_at = self.opened_at_nanos.load(Ordering::SeqCst);
                let elapsed = self.now_nanos().saturating_sub(opened_at);
                if u128::from(elapsed) >= self.config.delay.as_nanos() {
                    self.half_open();
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_failures.load(Ordering::SeqCst) > 0 {
                    self.open(1.0);
                    CircuitState::Open
                } else if self.trial_successes.load(Ordering::SeqCst)
                    >= u64::from(self.config.success_threshold)
                {
                    self.close();
                    CircuitState::Closed
                } else {
                    CircuitState::HalfOpen
                }
            }
        }
    }

    fn reset_window(&self) {
        self.requests.store(0, Ordering::SeqCst);
        self.failures.store(0, Ordering::SeqCst);
    }

    fn reset_trials(&self) {
        self.trials_admitted.store(0, Ordering::SeqCst);
        self.trial_successes.store(0, Ordering::SeqCst);
        self.trial_failures.store(0, Ordering::SeqCst);
    }

    fn open(&self, ratio: f64) {
        warn!(
            method = %self.method,
            failure_ratio = ratio,
            delay = ?self.config.delay,
            "Circuit breaker OPENED"
        );
        self.opened_at_nanos.store(self.now_nanos(), Ordering::SeqCst);
        self.reset_trials();
        self.times_opened.fetch_add(1, Ordering::Relaxed);
        self.status.store(CircuitState::Open as u8, Ordering::SeqCst);
    }

    fn half_open(&self) {
        debug!(method = %self.method, "Circuit breaker transitioning to HALF-OPEN");
        self.reset_trials();
        self.status.store(CircuitState::HalfOpen as u8, Ordering::SeqCst);
    }

    fn close(&self) {
        info!(method = %self.method, "Circuit breaker CLOSED");
        self.reset_window();
        self.reset_trials();
        self.status.store(CircuitState::Closed as u8, Ordering::SeqCst);
    }

    /// Try to take one of the half-open trial slots.
    fn admit_trial(&self) -> bool {
        let limit = u64::from(self.config.success_threshold);
        self.trials_admitted
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |admitted| {
                (admitted < limit).then_some(admitted + 1)
            })
            .is_ok()
    }

    fn classify(&self, error: &FaultToleranceError) -> Outcome {
        if error.is_definition() {
            Outcome::Ignored
        } else if self.config.failure_filter.applies(error.failure_type()) {
            Outcome::Failure
        } else {
            Outcome::Success
        }
    }

    fn record(&self, admitted_in: CircuitState, outcome: Outcome) {
        match outcome {
            Outcome::Success => {
                self.total_successes.fetch_add(1, Ordering::Relaxed);
                self.requests.fetch_add(1, Ordering::SeqCst);
                if admitted_in == CircuitState::HalfOpen {
                    self.trial_successes.fetch_add(1, Ordering::SeqCst);
                }
            }
            Outcome::Failure => {
                self.total_failures.fetch_add(1, Ordering::Relaxed);
                self.requests.fetch_add(1, Ordering::SeqCst);
                self.failures.fetch_add(1, Ordering::SeqCst);
                if admitted_in == CircuitState::HalfOpen {
                    self.trial_failures.fetch_add(1, Ordering::SeqCst);
                }
            }
            Outcome::Ignored => self.release_trial(admitted_in),
        }
    }

    fn release_trial(&self, admitted_in: CircuitState) {
        if admitted_in == CircuitState::HalfOpen {
            let _ = self
                .trials_admitted
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        }
    }

    /// Execute `f` with circuit breaker protection.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let state = self.evaluate();
        let admitted = match state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => self.admit_trial(),
        };

        if !admitted {
            self.total_rejections.fetch_add(1, Ordering::Relaxed);
            debug!(method = %self.method, state = %state, "Circuit breaker rejected request");
            return Err(FaultToleranceError::CircuitOpen {
                method: self.method.to_string(),
            });
        }

        let mut trial = TrialGuard {
            breaker: self,
            admitted_in: state,
            armed: true,
        };

        let result = f().await;
        trial.armed = false;

        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(error) => self.classify(error),
        };
        self.record(state, outcome);

        result
    }

    /// Manually force the circuit open.
    pub fn force_open(&self) {
        let _guard = self.transition.lock();
        if self.load_state() != CircuitState::Open {
            self.open(1.0);
        }
    }

    /// Manually reset the circuit breaker to closed state.
    pub fn reset(&self) {
        let _guard = self.transition.lock();
        self.close();
    }

    /// Get circuit breaker statistics.
    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            method: self.method.to_string(),
            state: self.load_state(),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
            times_opened: self.times_opened.load(Ordering::Relaxed),
            window_requests: self.requests.load(Ordering::SeqCst),
            window_failures: self.failures.load(Ordering::SeqCst),
        }
    }
}

/// Gives back a half-open trial slot when a call is abandoned mid-flight.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    admitted_in: CircuitState,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_trial(self.admitted_in);
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Interceptor<T> for CircuitBreaker {
    fn priority(&self) -> Priority {
        Priority::CircuitBreaker
    }

    async fn intercept(&self, _context: Arc<InvocationContext>, next: GuardedCall<T>) -> Result<T> {
        self.call(|| next()).await
    }
}

/// Circuit breaker statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    /// Guarded method.
    pub method: String,
    /// Current state.
    pub state: CircuitState,
    /// Total requests, including rejected ones.
    pub total_requests: u64,
    /// Total successes.
    pub total_successes: u64,
    /// Total failures.
    pub total_failures: u64,
    /// Total rejections.
    pub total_rejections: u64,
    /// How often the circuit opened.
    pub times_opened: u64,
    /// Requests recorded in the current window.
    pub window_requests: u64,
    /// Failures recorded in the current window.
    pub window_failures: u64,
}

impl CircuitBreakerStats {
    /// Failure ratio of the current window (0.0 - 1.0).
    pub fn window_failure_ratio(&self) -> f64 {
        if self.window_requests == 0 {
            0.0
        } else {
            self.window_failures as f64 / self.window_requests as f64
        }
    }
}
