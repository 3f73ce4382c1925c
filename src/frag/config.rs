//! Reassembly configuration.

use std::time::Duration;

/// Default number of reassembly buffer slots.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default timeout after which an incomplete reassembly is garbage collected.
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default (and maximum) reassembled datagram size: the IPv6 payload limit.
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 65_535;

/// Default bound on disjoint ranges tracked per reassembly context.
pub const DEFAULT_MAX_RANGES: usize = 16;

/// Configuration for the reassembly buffer pool.
#[derive(Debug, Clone)]
pub struct FragConfig {
    /// Number of pool slots. At least 1.
    pub pool_size: usize,
    /// Age after which an incomplete context is garbage collected.
    pub timeout: Duration,
    /// Upper bound on a reassembled datagram's payload size.
    pub max_datagram_size: usize,
    /// Upper bound on disjoint received ranges per context.
    pub max_ranges: usize,
}

impl Default for FragConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            timeout: DEFAULT_REASSEMBLY_TIMEOUT,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            max_ranges: DEFAULT_MAX_RANGES,
        }
    }
}

impl FragConfig {
    /// Set the number of pool slots (clamped to at least 1).
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// Set the garbage collection timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the datagram size bound (clamped to the IPv6 payload limit).
    pub fn with_max_datagram_size(mut self, max: usize) -> Self {
        self.max_datagram_size = max.min(DEFAULT_MAX_DATAGRAM_SIZE);
        self
    }

    /// Set the per-context bound on disjoint ranges (clamped to at least 1).
    pub fn with_max_ranges(mut self, max: usize) -> Self {
        self.max_ranges = max.max(1);
        self
    }
}
