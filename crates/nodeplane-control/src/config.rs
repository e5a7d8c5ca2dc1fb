//! Runtime knobs, constructed by the embedding process

use std::time::Duration;

/// Dispatcher limits
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Deadline used by [`crate::Dispatcher::send`]
    pub default_timeout: Duration,
    /// Largest deadline a caller may ask for
    pub max_timeout: Duration,
    /// Commands awaiting a response per node before new ones are refused
    pub max_in_flight: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            max_timeout: Duration::from_secs(120),
            max_in_flight: 64,
        }
    }
}

/// When nodes get a full reconcile without an operator asking
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Reconcile a node as soon as its channel attaches
    pub resync_on_connect: bool,
    /// Period of the background sweep; zero disables it
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            resync_on_connect: true,
            interval: Duration::ZERO,
        }
    }
}

impl SweepConfig {
    pub fn sweep_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}
