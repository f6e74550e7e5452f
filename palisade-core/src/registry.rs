//! Lazily created per-method policy state.
//!
//! Circuit breaker windows and bulkhead limiters are shared by every caller of
//! the same guarded method and live for as long as their registry. Creation
//! goes through a check-or-insert on a concurrent map, so at most one state
//! instance exists per method even when first calls race.

use crate::invocation::MethodSignature;
use crate::resilience::{Bulkhead, CircuitBreaker};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Concurrent arena mapping a guarded method to its state.
pub struct PolicyRegistry<S> {
    entries: DashMap<MethodSignature, Arc<S>>,
}

impl<S> PolicyRegistry<S> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Return the state for `key`, creating it with `init` on first use.
    ///
    /// `init` runs at most once per key.
    pub fn get_or_create<F>(&self, key: &MethodSignature, init: F) -> Arc<S>
    where
        F: FnOnce() -> S,
    {
        if let Some(existing) = self.entries.get(key) {
            return existing.clone();
        }
        self.entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(init()))
            .clone()
    }

    /// Like [`get_or_create`](Self::get_or_create) with a fallible `init`.
    /// Nothing is stored when `init` fails.
    pub fn try_get_or_create<F, E>(&self, key: &MethodSignature, init: F) -> Result<Arc<S>, E>
    where
        F: FnOnce() -> Result<S, E>,
    {
        if let Some(existing) = self.entries.get(key) {
            return Ok(existing.clone());
        }
        match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let state = Arc::new(init()?);
                entry.insert(state.clone());
                Ok(state)
            }
        }
    }

    /// Return the state for `key` if it exists.
    pub fn get(&self, key: &MethodSignature) -> Option<Arc<S>> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all keys.
    pub fn keys(&self) -> Vec<MethodSignature> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl<S> Default for PolicyRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: Lazy<Arc<FaultToleranceRegistry>> =
    Lazy::new(|| Arc::new(FaultToleranceRegistry::new()));

/// All shared state of the fault tolerance layers.
#[derive(Default)]
pub struct FaultToleranceRegistry {
    circuit_breakers: PolicyRegistry<CircuitBreaker>,
    bulkheads: PolicyRegistry<Bulkhead>,
}

impl FaultToleranceRegistry {
    /// Create an isolated registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<Self> {
        GLOBAL.clone()
    }

    pub fn circuit_breakers(&self) -> &PolicyRegistry<CircuitBreaker> {
        &self.circuit_breakers
    }

    pub fn bulkheads(&self) -> &PolicyRegistry<Bulkhead> {
        &self.bulkheads
    }
}
