// Structural validation of configuration documents

use crate::document::{FaultToleranceDocument, MethodSection};
use crate::{ConfigError, Result};

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Configuration validator with rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a number is within range
    pub fn in_range<T: PartialOrd + std::fmt::Display>(
        value: T,
        min: T,
        max: T,
        field: &str,
    ) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::ValidationError(format!(
                "{} must be between {} and {}, got {}",
                field, min, max, value
            )));
        }
        Ok(())
    }

    /// Validate that a number is at least `min`
    pub fn at_least<T: PartialOrd + std::fmt::Display>(
        value: T,
        min: T,
        field: &str,
    ) -> Result<()> {
        if value < min {
            return Err(ConfigError::ValidationError(format!(
                "{} must be at least {}, got {}",
                field, min, value
            )));
        }
        Ok(())
    }

    /// Validate a `Type/method` key
    pub fn method_key(key: &str) -> Result<()> {
        match key.split_once('/') {
            Some((ty, method)) if !ty.is_empty() && !method.is_empty() && !method.contains('/') => {
                Ok(())
            }
            _ => Err(ConfigError::ValidationError(format!(
                "method key '{}' must have the form Type/method",
                key
            ))),
        }
    }
}

impl Validate for MethodSection {
    fn validate(&self) -> Result<()> {
        if let Some(cb) = &self.circuit_breaker {
            ConfigValidator::at_least(
                cb.request_volume_threshold,
                1,
                "circuit_breaker.request_volume_threshold",
            )?;
            ConfigValidator::in_range(cb.failure_ratio, 0.0, 1.0, "circuit_breaker.failure_ratio")?;
            ConfigValidator::at_least(
                cb.success_threshold,
                1,
                "circuit_breaker.success_threshold",
            )?;
        }
        if let Some(bulkhead) = &self.bulkhead {
            ConfigValidator::at_least(bulkhead.value, 1, "bulkhead.value")?;
            ConfigValidator::at_least(
                bulkhead.waiting_task_queue,
                1,
                "bulkhead.waiting_task_queue",
            )?;
        }
        if let Some(timeout) = &self.timeout {
            ConfigValidator::at_least(timeout.value_ms, 1, "timeout.value_ms")?;
        }
        if let Some(fallback) = &self.fallback {
            ConfigValidator::not_empty(&fallback.method, "fallback.method")?;
        }
        Ok(())
    }
}

impl Validate for FaultToleranceDocument {
    fn validate(&self) -> Result<()> {
        for (key, section) in &self.methods {
            ConfigValidator::method_key(key)?;
            section.validate().map_err(|e| match e {
                ConfigError::ValidationError(msg) => {
                    ConfigError::ValidationError(format!("{}: {}", key, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}
