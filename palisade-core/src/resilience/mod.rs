//! # Fault Tolerance Policies
//!
//! Each policy can be used on its own or composed by
//! [`FaultTolerance`](crate::pipeline::FaultTolerance) around an
//! [`Invocation`](crate::invocation::Invocation).
//!
//! ## Policies Included
//!
//! - **Circuit Breaker**: fail fast while a method keeps failing
//! - **Bulkhead**: cap concurrent executions per method
//! - **Retry**: repeat failed calls with delay and jitter
//! - **Timeout**: bound the duration of a call
//! - **Fallback**: substitute a result when a call fails
//! - **Asynchronous**: run a call on a worker and hand back a handle
//!
//! Composed, they run outermost first in the order listed by
//! [`Priority`](crate::interceptor::Priority): circuit breaker, bulkhead,
//! fallback, retry, timeout.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use palisade_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! let circuit = CircuitBreaker::new(
//!     MethodSignature::new("Payments", "charge"),
//!     CircuitBreakerConfig::default().request_volume_threshold(10),
//! )?;
//!
//! let result = circuit.call(|| async {
//!     external_api_call().await
//! }).await;
//! ```

mod asynchronous;
mod bulkhead;
mod circuit_breaker;
mod fallback;
mod retry;
mod timeout;
mod worker;

pub use asynchronous::*;
pub use bulkhead::*;
pub use circuit_breaker::*;
pub use fallback::*;
pub use retry::*;
pub use timeout::*;
