//! Failure type hierarchy and classification.
//!
//! Every failure that reaches a policy layer carries a [`FailureType`]. Types
//! form a single-inheritance tree declared as `static` items, and policy
//! configurations list the types they react to. Matching is hierarchical: a
//! failure matches a listed type when it is that type or one of its
//! descendants.
//!
//! ```rust
//! use palisade_core::failure::{FailureFilter, FailureType, FAILURE};
//!
//! static IO: FailureType = FailureType::extends("IoFailure", &FAILURE);
//! static CONNECT: FailureType = FailureType::extends("ConnectFailure", &IO);
//!
//! let filter = FailureFilter::new(vec![&IO], vec![]);
//! assert!(filter.applies(&CONNECT));
//! assert!(!filter.applies(&FAILURE));
//! ```

use std::fmt;
use std::ptr;

/// A node in the failure type hierarchy.
///
/// Identity is the address of the `static` item, so two types with the same
/// name declared in different places are distinct.
pub struct FailureType {
    name: &'static str,
    parent: Option<&'static FailureType>,
}

impl FailureType {
    /// Declare a root type with no parent.
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// Declare a type deriving from `parent`.
    pub const fn extends(name: &'static str, parent: &'static FailureType) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    /// Type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Direct parent, if any.
    pub fn parent(&self) -> Option<&'static FailureType> {
        self.parent
    }

    /// Whether `self` equals `other` or derives from it.
    pub fn is_a(&self, other: &FailureType) -> bool {
        if ptr::eq(self, other) {
            return true;
        }
        let mut current = self.parent;
        while let Some(ty) = current {
            if ptr::eq(ty, other) {
                return true;
            }
            current = ty.parent;
        }
        false
    }

    /// Iterate from this type up to its root.
    pub fn ancestry(&self) -> impl Iterator<Item = &FailureType> {
        std::iter::successors(Some(self), |ty| ty.parent.map(|p| p as &FailureType))
    }
}

impl PartialEq for FailureType {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self, other)
    }
}

impl Eq for FailureType {}

impl fmt::Debug for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FailureType({})", self.name)
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Root of every failure.
pub static FAILURE: FailureType = FailureType::root("Failure");

/// A guarded call that panicked on its worker.
pub static PANICKED: FailureType = FailureType::extends("Panicked", &FAILURE);

/// Base of every failure produced by the fault tolerance layers themselves.
pub static FAULT_TOLERANCE: FailureType = FailureType::extends("FaultToleranceFailure", &FAILURE);

/// Raised when a circuit breaker rejects a call.
pub static CIRCUIT_BREAKER_OPEN: FailureType =
    FailureType::extends("CircuitBreakerOpen", &FAULT_TOLERANCE);

/// Raised when a bulkhead has no capacity left.
pub static BULKHEAD_REJECTED: FailureType =
    FailureType::extends("BulkheadRejected", &FAULT_TOLERANCE);

/// Raised when a deadline elapses.
pub static TIMEOUT: FailureType = FailureType::extends("Timeout", &FAULT_TOLERANCE);

/// Raised for invalid static configuration.
pub static DEFINITION: FailureType =
    FailureType::extends("FaultToleranceDefinition", &FAULT_TOLERANCE);

/// Raised when an asynchronous execution is cancelled.
pub static CANCELLED: FailureType = FailureType::extends("Cancelled", &FAULT_TOLERANCE);

/// All built-in types, roots first.
pub fn builtin_types() -> [&'static FailureType; 8] {
    [
        &FAILURE,
        &PANICKED,
        &FAULT_TOLERANCE,
        &CIRCUIT_BREAKER_OPEN,
        &BULKHEAD_REJECTED,
        &TIMEOUT,
        &DEFINITION,
        &CANCELLED,
    ]
}

/// True iff `failure` equals or derives from any of `types`.
pub fn is_derived(failure: &FailureType, types: &[&'static FailureType]) -> bool {
    types.iter().any(|ty| failure.is_a(ty))
}

/// An applied list paired with an excluded list.
///
/// Used as retry-on/abort-on, apply-on/skip-on and fail-on/skip-on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureFilter {
    applied: Vec<&'static FailureType>,
    excluded: Vec<&'static FailureType>,
}

impl FailureFilter {
    /// Create a filter from both lists.
    pub fn new(applied: Vec<&'static FailureType>, excluded: Vec<&'static FailureType>) -> Self {
        Self { applied, excluded }
    }

    /// A filter that matches everything.
    pub fn any() -> Self {
        Self::default()
    }

    /// Add a type to the applied list.
    pub fn apply_on(mut self, ty: &'static FailureType) -> Self {
        self.applied.push(ty);
        self
    }

    /// Add a type to the excluded list.
    pub fn exclude(mut self, ty: &'static FailureType) -> Self {
        self.excluded.push(ty);
        self
    }

    /// Applied types.
    pub fn applied(&self) -> &[&'static FailureType] {
        &self.applied
    }

    /// Excluded types.
    pub fn excluded(&self) -> &[&'static FailureType] {
        &self.excluded
    }

    /// Decide whether a failure of type `failure` is covered by this filter.
    ///
    /// Empty lists impose no constraint: with both empty everything applies.
    pub fn applies(&self, failure: &FailureType) -> bool {
        let applied = self.applied.is_empty() || is_derived(failure, &self.applied);
        let excluded = !self.excluded.is_empty() && is_derived(failure, &self.excluded);
        applied && !excluded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static IO: FailureType = FailureType::extends("IoFailure", &FAILURE);
    static CONNECT: FailureType = FailureType::extends("ConnectFailure", &IO);
    static PARSE: FailureType = FailureType::extends("ParseFailure", &FAILURE);

    #[test]
    fn test_hierarchy() {
        assert!(CONNECT.is_a(&CONNECT));
        assert!(CONNECT.is_a(&IO));
        assert!(CONNECT.is_a(&FAILURE));
        assert!(!IO.is_a(&CONNECT));
        assert!(!PARSE.is_a(&IO));
        assert!(TIMEOUT.is_a(&FAULT_TOLERANCE));

        let names: Vec<_> = CONNECT.ancestry().map(FailureType::name).collect();
        assert_eq!(names, vec!["ConnectFailure", "IoFailure", "Failure"]);
    }

    #[test]
    fn test_same_name_is_not_same_type() {
        static OTHER_IO: FailureType = FailureType::extends("IoFailure", &FAILURE);
        assert_ne!(&OTHER_IO, &IO);
        assert!(!OTHER_IO.is_a(&IO));
    }

    #[test]
    fn test_is_derived() {
        assert!(is_derived(&CONNECT, &[&PARSE, &IO]));
        assert!(!is_derived(&PARSE, &[&IO]));
        assert!(!is_derived(&PARSE, &[]));
    }

    #[test]
    fn test_filter_decision_table() {
        // neither list
        assert!(FailureFilter::any().applies(&PARSE));

        // only applied
        let only_applied = FailureFilter::new(vec![&IO], vec![]);
        assert!(only_applied.applies(&CONNECT));
        assert!(!only_applied.applies(&PARSE));

        // only excluded
        let only_excluded = FailureFilter::new(vec![], vec![&IO]);
        assert!(!only_excluded.applies(&CONNECT));
        assert!(only_excluded.applies(&PARSE));

        // both
        let both = FailureFilter::new(vec![&IO], vec![&CONNECT]);
        assert!(both.applies(&IO));
        assert!(!both.applies(&CONNECT));
        assert!(!both.applies(&PARSE));
    }

    #[test]
    fn test_classification_is_pure() {
        let filter = FailureFilter::any().apply_on(&FAILURE).exclude(&TIMEOUT);
        let first = filter.applies(&CIRCUIT_BREAKER_OPEN);
        for _ in 0..10 {
            assert_eq!(filter.applies(&CIRCUIT_BREAKER_OPEN), first);
            assert!(!filter.applies(&TIMEOUT));
        }
    }
}
