use std::time::Duration;

use crate::error::Error;

/// Default ceiling on random blinding attempts
pub const DEFAULT_MAX_BLINDING_ATTEMPTS: u64 = 1_000_000;

/// Default ceiling on oracle queries
///
/// Attacks against 2048-bit keys routinely need tens of thousands of queries
pub const DEFAULT_MAX_QUERIES: u64 = 1_000_000;

/// Default number of retries after a transport failure
pub const DEFAULT_PROBE_RETRIES: u32 = 1;

/// Default number of queries between progress events
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1_000;

/// Attack tuning knobs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttackConfig {
    pub max_blinding_attempts: u64,
    pub max_queries: u64,
    /// Per-probe timeout, None waits forever
    pub probe_timeout: Option<Duration>,
    pub probe_retries: u32,
    /// Number of probes in flight during linear searches (1 is strictly sequential)
    pub parallel_window_size: usize,
    /// Seed for blinding factors, None seeds from OS entropy
    pub rng_seed: Option<u64>,
    pub progress_interval: u64,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            max_blinding_attempts: DEFAULT_MAX_BLINDING_ATTEMPTS,
            max_queries: DEFAULT_MAX_QUERIES,
            probe_timeout: None,
            probe_retries: DEFAULT_PROBE_RETRIES,
            parallel_window_size: 1,
            rng_seed: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl AttackConfig {
    pub fn with_max_blinding_attempts(mut self, attempts: u64) -> Self {
        self.max_blinding_attempts = attempts;
        self
    }

    pub fn with_max_queries(mut self, queries: u64) -> Self {
        self.max_queries = queries;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    pub fn with_probe_retries(mut self, retries: u32) -> Self {
        self.probe_retries = retries;
        self
    }

    pub fn with_parallel_window_size(mut self, size: usize) -> Self {
        self.parallel_window_size = size;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Check the configuration can drive an attack
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_blinding_attempts == 0 {
            return Err(Error::InvalidConfig("max_blinding_attempts must be at least 1"));
        }

        if self.max_queries == 0 {
            return Err(Error::InvalidConfig("max_queries must be at least 1"));
        }

        if self.parallel_window_size == 0 {
            return Err(Error::InvalidConfig("parallel_window_size must be at least 1"));
        }

        if self.probe_timeout == Some(Duration::from_secs(0)) {
            return Err(Error::InvalidConfig("probe_timeout must be non-zero"));
        }

        if self.progress_interval == 0 {
            return Err(Error::InvalidConfig("progress_interval must be at least 1"));
        }

        Ok(())
    }

    /// Whether probes run on the calling thread
    ///
    /// Timeouts and speculative windows need probes on worker threads
    pub(crate) fn is_inline(&self) -> bool {
        self.parallel_window_size == 1 && self.probe_timeout.is_none()
    }
}
