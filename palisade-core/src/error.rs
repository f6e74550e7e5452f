//! Error types for guarded invocations.

use crate::failure::{
    BULKHEAD_REJECTED, CANCELLED, CIRCUIT_BREAKER_OPEN, DEFINITION, FAILURE, FailureType, PANICKED,
    TIMEOUT,
};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for guarded invocations.
pub type Result<T> = std::result::Result<T, FaultToleranceError>;

/// A failure raised by business logic, tagged with its [`FailureType`].
#[derive(Clone)]
pub struct Failure {
    failure_type: &'static FailureType,
    message: String,
    source: Option<Arc<dyn StdError + Send + Sync + 'static>>,
}

impl Failure {
    /// Create a failure with a message.
    pub fn new(failure_type: &'static FailureType, message: impl Into<String>) -> Self {
        Self {
            failure_type,
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an existing error, using its display text as the message.
    pub fn from_error<E>(failure_type: &'static FailureType, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            failure_type,
            message: error.to_string(),
            source: Some(Arc::new(error)),
        }
    }

    /// A failure of the root type.
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(&FAILURE, message)
    }

    pub(crate) fn panicked(message: impl Into<String>) -> Self {
        Self::new(&PANICKED, message)
    }

    /// The failure's type.
    pub fn failure_type(&self) -> &'static FailureType {
        self.failure_type
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Downcast the wrapped error, if any.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.source.as_deref()?.downcast_ref::<E>()
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("type", &self.failure_type.name())
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.failure_type, self.message)
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// Errors surfaced to the caller of a guarded invocation.
#[derive(Debug, Clone, Error)]
pub enum FaultToleranceError {
    /// The guarded call itself failed.
    #[error(transparent)]
    Failure(Failure),

    /// The circuit breaker is open and the call was not attempted.
    #[error("Circuit breaker for {method} is open")]
    CircuitOpen {
        /// Guarded method.
        method: String,
    },

    /// The bulkhead has no free slot.
    #[error("Bulkhead for {method} is full ({max_concurrent} running, {queue_size} queued)")]
    BulkheadFull {
        /// Guarded method.
        method: String,
        /// Maximum concurrent executions.
        max_concurrent: usize,
        /// Size of the waiting queue (0 for semaphore isolation).
        queue_size: usize,
    },

    /// The call did not finish within its deadline.
    #[error("{method} timed out after {duration:?}")]
    Timeout {
        /// Guarded method.
        method: String,
        /// Deadline that elapsed.
        duration: Duration,
    },

    /// The static configuration is invalid.
    #[error("Invalid fault tolerance definition: {0}")]
    Definition(String),

    /// An asynchronous execution was cancelled before completing.
    #[error("Asynchronous execution of {method} was cancelled")]
    Cancelled {
        /// Guarded method.
        method: String,
    },
}

impl FaultToleranceError {
    /// Create a definition error.
    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition(message.into())
    }

    /// The failure type used when classifying this error.
    pub fn failure_type(&self) -> &'static FailureType {
        match self {
            Self::Failure(failure) => failure.failure_type(),
            Self::CircuitOpen { .. } => &CIRCUIT_BREAKER_OPEN,
            Self::BulkheadFull { .. } => &BULKHEAD_REJECTED,
            Self::Timeout { .. } => &TIMEOUT,
            Self::Definition(_) => &DEFINITION,
            Self::Cancelled { .. } => &CANCELLED,
        }
    }

    /// Whether the error came from the business logic.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Whether this is a circuit breaker rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Whether this is a bulkhead rejection.
    pub fn is_bulkhead_full(&self) -> bool {
        matches!(self, Self::BulkheadFull { .. })
    }

    /// Whether this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this is a definition error. Definition errors are never
    /// classified by any policy.
    pub fn is_definition(&self) -> bool {
        matches!(self, Self::Definition(_))
    }

    /// The business failure, if this error carries one.
    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<Failure> for FaultToleranceError {
    fn from(failure: Failure) -> Self {
        Self::Failure(failure)
    }
}
