//! File and environment configuration for Palisade fault tolerance policies.
//!
//! ```rust,ignore
//! use palisade_config::{ConfigManager, FailureTypeRegistry};
//!
//! let mut manager = ConfigManager::new()
//!     .with_failure_types(FailureTypeRegistry::new().register(&IO_FAILURE));
//! manager.load_file("fault-tolerance.toml")?;
//! manager.apply_env()?;
//!
//! let charge = manager
//!     .builder::<Receipt>(MethodSignature::new("Payments", "charge"))?
//!     .build()?;
//! ```

pub mod document;
pub mod env;
pub mod error;
pub mod loader;
pub mod types;
pub mod validation;

pub use document::{
    BulkheadSection, CircuitBreakerSection, FallbackSection, FaultToleranceDocument,
    MethodSection, RetrySection, TimeoutSection,
};
pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use types::FailureTypeRegistry;
pub use validation::{ConfigValidator, Validate};

use palisade_core::{FaultToleranceBuilder, FaultToleranceSettings, MethodSignature};
use std::path::Path;
use tracing::info;

/// Collects configuration from files and the environment.
///
/// Later loads override earlier ones: sections replace whole sections and
/// environment overrides are applied on top of the file settings.
pub struct ConfigManager {
    document: FaultToleranceDocument,
    types: FailureTypeRegistry,
    env: EnvLoader,
}

impl ConfigManager {
    /// Create an empty manager with the built-in failure types.
    pub fn new() -> Self {
        Self {
            document: FaultToleranceDocument::default(),
            types: FailureTypeRegistry::new(),
            env: EnvLoader::default(),
        }
    }

    /// Use a different environment variable prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env = EnvLoader::new(Some(prefix.into()));
        self
    }

    /// Resolve failure type names through `types`.
    pub fn with_failure_types(mut self, types: FailureTypeRegistry) -> Self {
        self.types = types;
        self
    }

    /// Load, validate and merge a configuration file.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let document = ConfigLoader::auto(path)?.load_file(path)?;
        self.merge(document)?;
        info!(
            path = %path.display(),
            methods = self.document.methods.len(),
            "Loaded fault tolerance configuration"
        );
        Ok(())
    }

    /// Parse, validate and merge configuration text.
    pub fn load_str(&mut self, content: &str, format: FileFormat) -> Result<()> {
        let document = ConfigLoader::new(format).parse(content)?;
        self.merge(document)
    }

    /// Validate `document` and merge it over the current one.
    pub fn merge(&mut self, document: FaultToleranceDocument) -> Result<()> {
        document.validate()?;
        for section in document.methods.values() {
            self.check_section(section)?;
        }
        self.document.merge(document);
        Ok(())
    }

    /// Load a `.env` file, then apply the environment.
    pub fn load_dotenv(&mut self, path: Option<&str>) -> Result<()> {
        self.env.load_dotenv(path)?;
        self.apply_env()
    }

    /// Apply environment overrides to the settings.
    pub fn apply_env(&mut self) -> Result<()> {
        self.document.settings = self.env.apply(self.document.settings)?;
        Ok(())
    }

    pub fn document(&self) -> &FaultToleranceDocument {
        &self.document
    }

    pub fn settings(&self) -> FaultToleranceSettings {
        self.document.settings
    }

    pub fn failure_types(&self) -> &FailureTypeRegistry {
        &self.types
    }

    /// Whether any policy is configured for `signature`.
    pub fn has(&self, signature: &MethodSignature) -> bool {
        self.document.section(signature).is_some()
    }

    /// Section for `signature`, or `MethodNotFound`.
    pub fn section(&self, signature: &MethodSignature) -> Result<&MethodSection> {
        self.document
            .section(signature)
            .ok_or_else(|| ConfigError::MethodNotFound(signature.config_key()))
    }

    /// Pipeline builder for `signature` with the configured policies.
    pub fn builder<T: Send + 'static>(
        &self,
        signature: MethodSignature,
    ) -> Result<FaultToleranceBuilder<T>> {
        self.document.builder(signature, &self.types)
    }

    // Resolves failure names and runs core validation at load time.
    fn check_section(&self, section: &MethodSection) -> Result<()> {
        if let Some(cb) = &section.circuit_breaker {
            cb.to_config(&self.types)?;
        }
        if let Some(bulkhead) = &section.bulkhead {
            bulkhead.to_config()?;
        }
        if let Some(retry) = &section.retry {
            retry.to_config(&self.types)?;
        }
        if let Some(timeout) = &section.timeout {
            timeout.to_config()?;
        }
        if let Some(fallback) = &section.fallback {
            fallback.to_config::<()>(&self.types)?;
        }
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_core::failure::{FAILURE, FailureType};
    use palisade_core::resilience::{CircuitState, FallbackRegistry};
    use palisade_core::{Failure, FaultToleranceRegistry};
    use std::sync::Arc;

    static IO: FailureType = FailureType::extends("IoFailure", &FAILURE);

    const POLICIES: &str = r#"
        [methods."Payments/charge".circuit_breaker]
        request_volume_threshold = 2
        failure_ratio = 0.5
        delay_ms = 60000
        fail_on = ["IoFailure"]

        [methods."Payments/charge".retry]
        max_retries = 0
    "#;

    #[test]
    fn test_unknown_failure_type_rejected_at_load() {
        let mut manager = ConfigManager::new();
        let err = manager.load_str(POLICIES, FileFormat::Toml).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFailureType(ref name) if name == "IoFailure"));
        assert!(manager.document().methods.is_empty());
    }

    #[test]
    fn test_missing_section() {
        let manager = ConfigManager::new();
        let sig = MethodSignature::new("Payments", "refund");
        assert!(!manager.has(&sig));
        assert!(matches!(
            manager.section(&sig),
            Err(ConfigError::MethodNotFound(_))
        ));
    }

    #[test]
    fn test_configured_pipeline() {
        let mut manager =
            ConfigManager::new().with_failure_types(FailureTypeRegistry::new().register(&IO));
        manager.load_str(POLICIES, FileFormat::Toml).unwrap();

        let sig = MethodSignature::new("Payments", "charge");
        let pipeline = manager
            .builder::<u32>(sig)
            .unwrap()
            .registry(Arc::new(FaultToleranceRegistry::new()))
            .fallback_registry(Arc::new(FallbackRegistry::new()))
            .build()
            .unwrap();

        for _ in 0..2 {
            let result = tokio_test::block_on(
                pipeline.call(|| async { Err::<u32, _>(Failure::new(&IO, "refused")) }),
            );
            assert!(result.is_err());
        }

        let circuit = pipeline.circuit_breaker().unwrap();
        assert_eq!(circuit.state(), CircuitState::Open);
        assert_eq!(pipeline.retry().unwrap().config().max_retries, 0);
    }
}
