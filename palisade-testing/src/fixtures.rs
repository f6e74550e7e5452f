// Failure type fixtures shared by tests

use palisade_core::Failure;
use palisade_core::failure::{FAILURE, FailureType};

/// An I/O failure.
pub static IO_FAILURE: FailureType = FailureType::extends("IoFailure", &FAILURE);

/// A connection failure, a kind of I/O failure.
pub static CONNECT_FAILURE: FailureType = FailureType::extends("ConnectFailure", &IO_FAILURE);

/// A failure unrelated to I/O.
pub static PARSE_FAILURE: FailureType = FailureType::extends("ParseFailure", &FAILURE);

/// All fixture types, parents first.
pub fn fixture_types() -> [&'static FailureType; 3] {
    [&IO_FAILURE, &CONNECT_FAILURE, &PARSE_FAILURE]
}

pub fn io_failure(message: &str) -> Failure {
    Failure::new(&IO_FAILURE, message)
}

pub fn connect_failure(message: &str) -> Failure {
    Failure::new(&CONNECT_FAILURE, message)
}

pub fn parse_failure(message: &str) -> Failure {
    Failure::new(&PARSE_FAILURE, message)
}
