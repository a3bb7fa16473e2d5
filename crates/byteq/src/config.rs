//! Queue configuration.

/// Construction parameters for a [`crate::Queue`].
///
/// Validated eagerly in [`Config::new`] rather than deferred to [`crate::Queue::new`]
/// so a misconfigured constant fails at the call site that built it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Ring capacity in bytes. Must be greater than zero.
    pub capacity: usize,
    /// Overwrite freed and reserved-but-unwritten bytes with sentinel fill
    /// values (`b'-'` for free, `b'r'` for reserved). Off by default: it
    /// costs a pass over every touched range on top of the real payload
    /// copy, and exists to make use-after-fetch and read-before-store bugs
    /// visible under a debugger or test harness, not for production use.
    pub debug_fill: bool,
    /// Track operation counts and byte totals in atomic counters, readable
    /// via [`crate::Queue::metrics`].
    pub enable_metrics: bool,
}

impl Config {
    #[must_use]
    pub const fn new(capacity: usize, debug_fill: bool, enable_metrics: bool) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        Self { capacity, debug_fill, enable_metrics }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(4096, false, false)
    }
}

/// Small ring with debug fill and metrics on, suited to tests and the demo
/// binary where visibility matters more than throughput.
pub const DEBUG_CONFIG: Config = Config::new(256, true, true);

/// Large ring with debug fill and metrics off, suited to production use.
pub const PRODUCTION_CONFIG: Config = Config::new(1 << 20, false, false);
