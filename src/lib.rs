// Palisade - fault tolerance for async Rust
//
// Guards calls with circuit breakers, bulkheads, retries, timeouts,
// fallbacks and asynchronous execution, composed per method.

// Re-export core functionality
pub use palisade_core::*;

// Re-export optional crates
#[cfg(feature = "config")]
pub use palisade_config;

#[cfg(feature = "testing")]
pub use palisade_testing;

// Prelude for common imports
pub mod prelude {
    pub use palisade_core::prelude::*;

    #[cfg(feature = "config")]
    pub use palisade_config::{ConfigManager, FailureTypeRegistry};
}
