// Concurrency probe for bulkhead tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    peak: AtomicUsize,
    entered: AtomicUsize,
}

/// Records how many guarded calls run at the same time.
///
/// Clones share their counters, so a probe can be moved into many call
/// closures and read from the test afterwards.
#[derive(Clone, Default)]
pub struct ConcurrencyProbe {
    counters: Arc<Counters>,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a call as running until the guard drops.
    pub fn enter(&self) -> ProbeGuard {
        let counters = &self.counters;
        counters.entered.fetch_add(1, Ordering::SeqCst);
        let now = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard {
            counters: self.counters.clone(),
        }
    }

    /// Stay inside the probe for `duration`.
    pub async fn occupy(&self, duration: Duration) {
        let _guard = self.enter();
        tokio::time::sleep(duration).await;
    }

    /// Calls running right now.
    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous calls seen.
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Calls that ever entered.
    pub fn entered(&self) -> usize {
        self.counters.entered.load(Ordering::SeqCst)
    }
}

/// Leaves the probe on drop.
pub struct ProbeGuard {
    counters: Arc<Counters>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}
