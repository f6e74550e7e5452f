// Assertions on policy outcomes

use palisade_core::failure::FailureType;
use palisade_core::resilience::{CircuitBreaker, CircuitState};
use palisade_core::Result;
use std::fmt::Debug;

/// Assert that a call failed with a failure of type `expected` (or a subtype).
#[track_caller]
pub fn assert_failure_type<T: Debug>(result: &Result<T>, expected: &'static FailureType) {
    match result {
        Err(err) => assert!(
            err.failure_type().is_a(expected),
            "Expected failure of type {}, got {} ({})",
            expected,
            err.failure_type(),
            err
        ),
        Ok(value) => panic!("Expected failure of type {}, got Ok({:?})", expected, value),
    }
}

/// Assert that a circuit breaker rejected the call.
#[track_caller]
pub fn assert_circuit_open<T: Debug>(result: &Result<T>) {
    assert!(
        matches!(result, Err(err) if err.is_circuit_open()),
        "Expected circuit breaker rejection, got {:?}",
        result
    );
}

/// Assert that a bulkhead rejected the call.
#[track_caller]
pub fn assert_bulkhead_full<T: Debug>(result: &Result<T>) {
    assert!(
        matches!(result, Err(err) if err.is_bulkhead_full()),
        "Expected bulkhead rejection, got {:?}",
        result
    );
}

/// Assert that the call timed out.
#[track_caller]
pub fn assert_timed_out<T: Debug>(result: &Result<T>) {
    assert!(
        matches!(result, Err(err) if err.is_timeout()),
        "Expected timeout, got {:?}",
        result
    );
}

/// Assert the current state of a circuit breaker.
#[track_caller]
pub fn assert_circuit_state(circuit: &CircuitBreaker, expected: CircuitState) {
    let actual = circuit.state();
    assert_eq!(
        actual,
        expected,
        "Expected circuit for {} to be {}, got {}",
        circuit.method(),
        expected,
        actual
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{CONNECT_FAILURE, IO_FAILURE, io_failure};
    use palisade_core::FaultToleranceError;
    use std::time::Duration;

    #[test]
    fn test_failure_type_matches_subtypes() {
        let result: Result<()> = Err(crate::fixtures::connect_failure("refused").into());
        assert_failure_type(&result, &IO_FAILURE);
        assert_failure_type(&result, &CONNECT_FAILURE);
    }

    #[test]
    #[should_panic(expected = "Expected failure of type ConnectFailure")]
    fn test_failure_type_mismatch_panics() {
        let result: Result<()> = Err(io_failure("reset").into());
        assert_failure_type(&result, &CONNECT_FAILURE);
    }

    #[test]
    fn test_rejection_assertions() {
        let open: Result<()> = Err(FaultToleranceError::CircuitOpen {
            method: "Svc/op".to_string(),
        });
        assert_circuit_open(&open);

        let full: Result<()> = Err(FaultToleranceError::BulkheadFull {
            method: "Svc/op".to_string(),
            max_concurrent: 1,
            queue_size: 0,
        });
        assert_bulkhead_full(&full);

        let late: Result<()> = Err(FaultToleranceError::Timeout {
            method: "Svc/op".to_string(),
            duration: Duration::from_millis(10),
        });
        assert_timed_out(&late);
    }
}
