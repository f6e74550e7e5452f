// Environment overrides for the policy switches

use crate::{ConfigError, Result};
use palisade_core::FaultToleranceSettings;
use std::collections::HashMap;
use std::env;
use tracing::debug;

/// Default environment variable prefix.
pub const DEFAULT_PREFIX: &str = "PALISADE";

/// Reads `PALISADE_*` variables and applies them to [`FaultToleranceSettings`].
///
/// Recognised keys after the prefix: `NON_FALLBACK_ENABLED`,
/// `CIRCUIT_BREAKER_ENABLED`, `BULKHEAD_ENABLED`, `RETRY_ENABLED`,
/// `TIMEOUT_ENABLED` and `FALLBACK_ENABLED`.
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    /// Create a new environment loader
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Load all variables under the prefix, keys lowercased with the prefix
    /// stripped.
    pub fn load(&self) -> Result<HashMap<String, String>> {
        Ok(self.collect(env::vars()))
    }

    fn collect(&self, vars: impl IntoIterator<Item = (String, String)>) -> HashMap<String, String> {
        let mut config = HashMap::new();

        for (key, value) in vars {
            if let Some(ref prefix) = self.prefix {
                if let Some(rest) = key.strip_prefix(prefix.as_str()) {
                    config.insert(rest.trim_start_matches('_').to_lowercase(), value);
                }
            } else {
                config.insert(key.to_lowercase(), value);
            }
        }

        config
    }

    /// Load a `.env` file into the process environment.
    ///
    /// With no path, a missing `.env` in the working directory is ignored.
    pub fn load_dotenv(&self, path: Option<&str>) -> Result<()> {
        match path {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        Ok(())
    }

    /// Apply the process environment to `settings`.
    pub fn apply(&self, settings: FaultToleranceSettings) -> Result<FaultToleranceSettings> {
        apply_overrides(settings, &self.load()?)
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(Some(DEFAULT_PREFIX.to_string()))
    }
}

/// Apply already collected overrides (keys lowercased, prefix stripped).
/// Unrecognised keys are ignored.
pub fn apply_overrides(
    mut settings: FaultToleranceSettings,
    vars: &HashMap<String, String>,
) -> Result<FaultToleranceSettings> {
    let switches: [(&str, &mut bool); 6] = [
        ("non_fallback_enabled", &mut settings.non_fallback_enabled),
        ("circuit_breaker_enabled", &mut settings.circuit_breaker_enabled),
        ("bulkhead_enabled", &mut settings.bulkhead_enabled),
        ("retry_enabled", &mut settings.retry_enabled),
        ("timeout_enabled", &mut settings.timeout_enabled),
        ("fallback_enabled", &mut settings.fallback_enabled),
    ];
    for (key, slot) in switches {
        if let Some(raw) = vars.get(key) {
            *slot = parse_bool(key, raw)?;
            debug!(key, value = *slot, "Applied environment override");
        }
    }
    Ok(settings)
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::ValidationError(format!(
            "{} must be a boolean, got '{}'",
            key, raw
        ))),
    }
}
