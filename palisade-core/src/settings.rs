//! Switches that turn policies off without touching their configuration.

use serde::{Deserialize, Serialize};

/// Which policy kinds are active.
///
/// `non_fallback_enabled = false` disables circuit breaker, bulkhead, retry
/// and timeout in one go while keeping fallback and asynchronous execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultToleranceSettings {
    pub non_fallback_enabled: bool,
    pub circuit_breaker_enabled: bool,
    pub bulkhead_enabled: bool,
    pub retry_enabled: bool,
    pub timeout_enabled: bool,
    pub fallback_enabled: bool,
}

impl Default for FaultToleranceSettings {
    fn default() -> Self {
        Self {
            non_fallback_enabled: true,
            circuit_breaker_enabled: true,
            bulkhead_enabled: true,
            retry_enabled: true,
            timeout_enabled: true,
            fallback_enabled: true,
        }
    }
}

impl FaultToleranceSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn non_fallback_enabled(mut self, enabled: bool) -> Self {
        self.non_fallback_enabled = enabled;
        self
    }

    pub fn circuit_breaker_enabled(mut self, enabled: bool) -> Self {
        self.circuit_breaker_enabled = enabled;
        self
    }

    pub fn bulkhead_enabled(mut self, enabled: bool) -> Self {
        self.bulkhead_enabled = enabled;
        self
    }

    pub fn retry_enabled(mut self, enabled: bool) -> Self {
        self.retry_enabled = enabled;
        self
    }

    pub fn timeout_enabled(mut self, enabled: bool) -> Self {
        self.timeout_enabled = enabled;
        self
    }

    pub fn fallback_enabled(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// Effective state of the circuit breaker.
    pub fn circuit_breaker_active(&self) -> bool {
        self.non_fallback_enabled && self.circuit_breaker_enabled
    }

    /// Effective state of the bulkhead.
    pub fn bulkhead_active(&self) -> bool {
        self.non_fallback_enabled && self.bulkhead_enabled
    }

    /// Effective state of retries.
    pub fn retry_active(&self) -> bool {
        self.non_fallback_enabled && self.retry_enabled
    }

    /// Effective state of the timeout.
    pub fn timeout_active(&self) -> bool {
        self.non_fallback_enabled && self.timeout_enabled
    }

    /// Effective state of the fallback.
    pub fn fallback_active(&self) -> bool {
        self.fallback_enabled
    }
}
