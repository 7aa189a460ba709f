//! Global atomic counters for the resolver.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single `tracing::info!`
//! event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters, no allocations and no locking.
pub struct Metrics {
    claims_allocated: AtomicU64,
    claims_failed: AtomicU64,
    race_retries: AtomicU64,
    devices_reserved: AtomicU64,
    selector_cache_hits: AtomicU64,
    selector_cache_misses: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            claims_allocated: AtomicU64::new(0),
            claims_failed: AtomicU64::new(0),
            race_retries: AtomicU64::new(0),
            devices_reserved: AtomicU64::new(0),
            selector_cache_hits: AtomicU64::new(0),
            selector_cache_misses: AtomicU64::new(0),
        }
    }

    pub fn inc_claims_allocated(&self) {
        self.claims_allocated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "claims_allocated", "counter incremented");
    }

    pub fn inc_claims_failed(&self) {
        self.claims_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "claims_failed", "counter incremented");
    }

    pub fn inc_race_retries(&self) {
        self.race_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "race_retries", "counter incremented");
    }

    /// Add the number of devices held by a committed allocation.
    pub fn add_devices_reserved(&self, n: u64) {
        self.devices_reserved.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "devices_reserved", n = n, "counter incremented");
    }

    /// Record one selector lookup in the compile cache.
    pub fn record_selector_lookup(&self, hit: bool) {
        if hit {
            self.selector_cache_hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(metric = "selector_cache_hits", "counter incremented");
        } else {
            self.selector_cache_misses.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(metric = "selector_cache_misses", "counter incremented");
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            claims_allocated = self.claims_allocated(),
            claims_failed = self.claims_failed(),
            race_retries = self.race_retries(),
            devices_reserved = self.devices_reserved(),
            selector_cache_hits = self.selector_cache_hits(),
            selector_cache_misses = self.selector_cache_misses(),
        );
    }

    pub fn claims_allocated(&self) -> u64 {
        self.claims_allocated.load(Ordering::Relaxed)
    }

    pub fn claims_failed(&self) -> u64 {
        self.claims_failed.load(Ordering::Relaxed)
    }

    pub fn race_retries(&self) -> u64 {
        self.race_retries.load(Ordering::Relaxed)
    }

    pub fn devices_reserved(&self) -> u64 {
        self.devices_reserved.load(Ordering::Relaxed)
    }

    pub fn selector_cache_hits(&self) -> u64 {
        self.selector_cache_hits.load(Ordering::Relaxed)
    }

    pub fn selector_cache_misses(&self) -> u64 {
        self.selector_cache_misses.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.claims_allocated.store(0, Ordering::Relaxed);
        self.claims_failed.store(0, Ordering::Relaxed);
        self.race_retries.store(0, Ordering::Relaxed);
        self.devices_reserved.store(0, Ordering::Relaxed);
        self.selector_cache_hits.store(0, Ordering::Relaxed);
        self.selector_cache_misses.store(0, Ordering::Relaxed);
    }
}
