//! Optional atomic operation counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Counters {
    reserves: AtomicU64,
    stores: AtomicU64,
    fetches: AtomicU64,
    internalizes: AtomicU64,
    cas_failures: AtomicU64,
    bytes_stored: AtomicU64,
    bytes_fetched: AtomicU64,
}

/// Atomic counters for queue activity, present only when
/// [`crate::Config::enable_metrics`] is set. When disabled, every record
/// call is a single branch over `None`.
#[derive(Debug, Default)]
pub(crate) struct Metrics(Option<Counters>);

impl Metrics {
    pub(crate) fn new(enabled: bool) -> Self {
        Self(enabled.then(Counters::default))
    }

    pub(crate) fn record_reserve(&self) {
        if let Some(c) = &self.0 {
            c.reserves.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_store(&self, bytes: usize) {
        if let Some(c) = &self.0 {
            c.stores.fetch_add(1, Ordering::Relaxed);
            c.bytes_stored.fetch_add(bytes as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_fetch(&self, bytes: usize) {
        if let Some(c) = &self.0 {
            c.fetches.fetch_add(1, Ordering::Relaxed);
            c.bytes_fetched.fetch_add(bytes as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_internalize(&self) {
        if let Some(c) = &self.0 {
            c.internalizes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_cas_failure(&self) {
        if let Some(c) = &self.0 {
            c.cas_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        match &self.0 {
            Some(c) => MetricsSnapshot {
                enabled: true,
                reserves: c.reserves.load(Ordering::Relaxed),
                stores: c.stores.load(Ordering::Relaxed),
                fetches: c.fetches.load(Ordering::Relaxed),
                internalizes: c.internalizes.load(Ordering::Relaxed),
                cas_failures: c.cas_failures.load(Ordering::Relaxed),
                bytes_stored: c.bytes_stored.load(Ordering::Relaxed),
                bytes_fetched: c.bytes_fetched.load(Ordering::Relaxed),
            },
            None => MetricsSnapshot { enabled: false, ..MetricsSnapshot::default() },
        }
    }
}

/// A point-in-time read of a queue's [`Metrics`], returned by
/// [`crate::Queue::metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub enabled: bool,
    pub reserves: u64,
    pub stores: u64,
    pub fetches: u64,
    pub internalizes: u64,
    pub cas_failures: u64,
    pub bytes_stored: u64,
    pub bytes_fetched: u64,
}
