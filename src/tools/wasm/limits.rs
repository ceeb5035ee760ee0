//! Resource limits applied to every provider call.

use std::time::Duration;

/// Default fuel budget per call.
pub const DEFAULT_FUEL_LIMIT: u64 = 10_000_000;

/// Default linear memory cap per call (10 MB).
pub const DEFAULT_MEMORY_LIMIT: u64 = 10 * 1024 * 1024;

/// Default wall-clock bound per call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Largest result a provider may hand back (1 MB).
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Per-call sandbox limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Fuel units available to one call.
    pub fuel: u64,
    /// Maximum linear memory in bytes.
    pub memory_bytes: u64,
    /// Wall-clock timeout.
    pub timeout: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            fuel: DEFAULT_FUEL_LIMIT,
            memory_bytes: DEFAULT_MEMORY_LIMIT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ResourceLimits {
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = fuel;
        self
    }

    pub fn with_memory(mut self, bytes: u64) -> Self {
        self.memory_bytes = bytes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
