//! Testing utilities for Palisade fault tolerance policies.
//!
//! ## Features
//!
//! - **ScriptedInvocation** - an invocation that plays back successes,
//!   failures and panics, counting calls
//! - **ConcurrencyProbe** - peak concurrency tracking for bulkhead tests
//! - **Fixtures** - a small failure type hierarchy
//! - **Assertions** - checks on rejections, timeouts and circuit state
//!
//! ## Quick Start
//!
//! ```no_run
//! use palisade_core::{FaultTolerance, FaultToleranceRegistry, MethodSignature};
//! use palisade_core::resilience::RetryConfig;
//! use palisade_testing::*;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let signature = MethodSignature::new("Inventory", "reserve");
//! let pipeline = FaultTolerance::<u32>::builder(signature.clone())
//!     .registry(Arc::new(FaultToleranceRegistry::new()))
//!     .retry(RetryConfig::new(3))
//!     .build()
//!     .unwrap();
//!
//! let invocation = ScriptedInvocation::new(signature)
//!     .fail_times(2, &IO_FAILURE, "connection reset")
//!     .succeed(7)
//!     .into_arc();
//!
//! assert_eq!(pipeline.invoke(invocation.clone()).await.unwrap(), 7);
//! assert_eq!(invocation.calls(), 3);
//! # });
//! ```

pub mod assertions;
pub mod fixtures;
pub mod probe;
pub mod script;

pub use assertions::*;
pub use fixtures::*;
pub use probe::{ConcurrencyProbe, ProbeGuard};
pub use script::{ScriptedInvocation, Step};
