// Failure type lookup by name

use crate::{ConfigError, Result};
use palisade_core::FailureType;
use palisade_core::failure::builtin_types;
use std::collections::HashMap;

/// Maps the failure type names used in configuration files to the declared
/// `static` types.
///
/// Starts with the built-in types. Application types are added with
/// [`register`](Self::register).
#[derive(Debug, Clone)]
pub struct FailureTypeRegistry {
    types: HashMap<&'static str, &'static FailureType>,
}

impl FailureTypeRegistry {
    /// Create a registry holding the built-in types.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for ty in builtin_types() {
            registry.types.insert(ty.name(), ty);
        }
        registry
    }

    /// Create a registry with no types at all.
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Register an application type under its name.
    ///
    /// A later registration with the same name replaces the earlier one.
    pub fn register(mut self, ty: &'static FailureType) -> Self {
        self.types.insert(ty.name(), ty);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Look up a type by name.
    pub fn resolve(&self, name: &str) -> Result<&'static FailureType> {
        self.types
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownFailureType(name.to_string()))
    }

    /// Look up every name, failing on the first unknown one.
    pub fn resolve_all(&self, names: &[String]) -> Result<Vec<&'static FailureType>> {
        names.iter().map(|name| self.resolve(name)).collect()
    }
}

impl Default for FailureTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
