// Core library for the Palisade fault tolerance layers
// Failure classification, invocation abstraction, policies and their composition

pub mod error;
pub mod failure;
pub mod interceptor;
pub mod invocation;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod resilience;
pub mod settings;

pub use error::{Failure, FaultToleranceError, Result};
pub use failure::{FailureFilter, FailureType};
pub use invocation::{FnInvocation, Invocation, InvocationContext, MethodSignature, ReturnType};
pub use pipeline::{FaultTolerance, FaultToleranceBuilder, FaultToleranceStats};
pub use registry::FaultToleranceRegistry;
pub use settings::FaultToleranceSettings;

/// Commonly used types.
pub mod prelude {
    pub use crate::error::{Failure, FaultToleranceError, Result};
    pub use crate::failure::{FAILURE, FailureFilter, FailureType};
    pub use crate::invocation::{FnInvocation, Invocation, MethodSignature, ReturnType};
    pub use crate::pipeline::FaultTolerance;
    pub use crate::registry::FaultToleranceRegistry;
    pub use crate::resilience::{
        AsyncHandle, BulkheadConfig, CircuitBreakerConfig, CircuitState, ExecutionContext,
        FallbackConfig, FallbackHandler, FallbackRegistry, RetryConfig, TimeoutConfig, handler_fn,
    };
    pub use crate::settings::FaultToleranceSettings;
}
