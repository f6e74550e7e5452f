//! Serde model of a fault tolerance configuration file.
//!
//! ```toml
//! [settings]
//! non_fallback_enabled = true
//!
//! [methods."Payments/charge".retry]
//! max_retries = 5
//! delay_ms = 100
//! retry_on = ["IoFailure"]
//!
//! [methods."Payments/charge".fallback]
//! method = "chargeLater"
//! ```
//!
//! Durations are milliseconds. Failure types are referenced by name and
//! resolved through a [`FailureTypeRegistry`].

use crate::types::FailureTypeRegistry;
use crate::{ConfigError, Result};
use palisade_core::resilience::{
    BulkheadConfig, CircuitBreakerConfig, FallbackConfig, RetryConfig, TimeoutConfig,
};
use palisade_core::{
    FailureFilter, FaultTolerance, FaultToleranceBuilder, FaultToleranceSettings, MethodSignature,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultToleranceDocument {
    pub settings: FaultToleranceSettings,
    /// Policy sections keyed `Type/method`.
    pub methods: BTreeMap<String, MethodSection>,
}

impl FaultToleranceDocument {
    /// Section for `signature`, if the document has one.
    pub fn section(&self, signature: &MethodSignature) -> Option<&MethodSection> {
        self.methods.get(&signature.config_key())
    }

    /// Start a pipeline builder for `signature` carrying the document's
    /// settings and the method's policies.
    ///
    /// Methods without a section get a builder with settings only.
    pub fn builder<T: Send + 'static>(
        &self,
        signature: MethodSignature,
        types: &FailureTypeRegistry,
    ) -> Result<FaultToleranceBuilder<T>> {
        let section = self.section(&signature).cloned();
        let builder = FaultTolerance::builder(signature).settings(self.settings);
        match section {
            Some(section) => section.apply(builder, types),
            None => Ok(builder),
        }
    }

    /// Merge `other` over `self`. Sections of `other` replace whole sections.
    pub fn merge(&mut self, other: FaultToleranceDocument) {
        self.settings = other.settings;
        self.methods.extend(other.methods);
    }
}

/// Policies declared for one method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodSection {
    pub circuit_breaker: Option<CircuitBreakerSection>,
    pub bulkhead: Option<BulkheadSection>,
    pub retry: Option<RetrySection>,
    pub timeout: Option<TimeoutSection>,
    pub fallback: Option<FallbackSection>,
    pub asynchronous: bool,
}

impl MethodSection {
    /// Add every declared policy to `builder`.
    pub fn apply<T: Send + 'static>(
        &self,
        mut builder: FaultToleranceBuilder<T>,
        types: &FailureTypeRegistry,
    ) -> Result<FaultToleranceBuilder<T>> {
        if let Some(section) = &self.circuit_breaker {
            builder = builder.circuit_breaker(section.to_config(types)?);
        }
        if let Some(section) = &self.bulkhead {
            builder = builder.bulkhead(section.to_config()?);
        }
        if let Some(section) = &self.retry {
            builder = builder.retry(section.to_config(types)?);
        }
        if let Some(section) = &self.timeout {
            builder = builder.timeout(section.to_config()?);
        }
        if let Some(section) = &self.fallback {
            builder = builder.fallback(section.to_config(types)?);
        }
        if self.asynchronous {
            builder = builder.asynchronous();
        }
        Ok(builder)
    }
}

fn filter(
    types: &FailureTypeRegistry,
    applied: &[String],
    excluded: &[String],
) -> Result<FailureFilter> {
    Ok(FailureFilter::new(
        types.resolve_all(applied)?,
        types.resolve_all(excluded)?,
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSection {
    pub delay_ms: u64,
    pub request_volume_threshold: u32,
    pub failure_ratio: f64,
    pub success_threshold: u32,
    pub fail_on: Vec<String>,
    pub skip_on: Vec<String>,
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            delay_ms: defaults.delay.as_millis() as u64,
            request_volume_threshold: defaults.request_volume_threshold,
            failure_ratio: defaults.failure_ratio,
            success_threshold: defaults.success_threshold,
            fail_on: Vec::new(),
            skip_on: Vec::new(),
        }
    }
}

impl CircuitBreakerSection {
    pub fn to_config(&self, types: &FailureTypeRegistry) -> Result<CircuitBreakerConfig> {
        let config = CircuitBreakerConfig {
            delay: Duration::from_millis(self.delay_ms),
            request_volume_threshold: self.request_volume_threshold,
            failure_ratio: self.failure_ratio,
            success_threshold: self.success_threshold,
            failure_filter: filter(types, &self.fail_on, &self.skip_on)?,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkheadSection {
    pub value: usize,
    pub waiting_task_queue: usize,
}

impl Default for BulkheadSection {
    fn default() -> Self {
        let defaults = BulkheadConfig::default();
        Self {
            value: defaults.value,
            waiting_task_queue: defaults.waiting_task_queue,
        }
    }
}

impl BulkheadSection {
    pub fn to_config(&self) -> Result<BulkheadConfig> {
        let config = BulkheadConfig::new(self.value).waiting_task_queue(self.waiting_task_queue);
        config.validate()?;
        Ok(config)
    }
}

/// Retry section. `max_duration_ms = 0` removes the time bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub delay_ms: u64,
    pub jitter_ms: u64,
    pub max_duration_ms: u64,
    pub retry_on: Vec<String>,
    pub abort_on: Vec<String>,
}

impl Default for RetrySection {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_retries: defaults.max_retries,
            delay_ms: defaults.delay.as_millis() as u64,
            jitter_ms: defaults.jitter.as_millis() as u64,
            max_duration_ms: defaults
                .max_duration
                .map_or(0, |bound| bound.as_millis() as u64),
            retry_on: Vec::new(),
            abort_on: Vec::new(),
        }
    }
}

impl RetrySection {
    pub fn to_config(&self, types: &FailureTypeRegistry) -> Result<RetryConfig> {
        let mut config = RetryConfig::new(self.max_retries)
            .delay(Duration::from_millis(self.delay_ms))
            .jitter(Duration::from_millis(self.jitter_ms));
        config = if self.max_duration_ms == 0 {
            config.unbounded()
        } else {
            config.max_duration(Duration::from_millis(self.max_duration_ms))
        };
        config.failure_filter = filter(types, &self.retry_on, &self.abort_on)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSection {
    pub value_ms: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            value_ms: TimeoutConfig::default().value.as_millis() as u64,
        }
    }
}

impl TimeoutSection {
    pub fn to_config(&self) -> Result<TimeoutConfig> {
        let config = TimeoutConfig::new(Duration::from_millis(self.value_ms));
        config.validate()?;
        Ok(config)
    }
}

/// Fallback section. Only named fallback methods can be configured from a
/// file; handlers are registered in code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSection {
    pub method: String,
    pub apply_on: Vec<String>,
    pub skip_on: Vec<String>,
}

impl FallbackSection {
    pub fn to_config<T>(&self, types: &FailureTypeRegistry) -> Result<FallbackConfig<T>> {
        if self.method.is_empty() {
            return Err(ConfigError::ValidationError(
                "fallback method cannot be empty".to_string(),
            ));
        }
        let mut config = FallbackConfig::method(self.method.clone());
        config.failure_filter = filter(types, &self.apply_on, &self.skip_on)?;
        Ok(config)
    }
}
