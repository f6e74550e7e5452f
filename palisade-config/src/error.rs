// Error types for fault tolerance configuration

use palisade_core::FaultToleranceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No configuration for method: {0}")]
    MethodNotFound(String),

    #[error("Unknown failure type: {0}")]
    UnknownFailureType(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid policy definition: {0}")]
    Definition(#[from] FaultToleranceError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvError(#[from] std::env::VarError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
