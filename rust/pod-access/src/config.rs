use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning for an [`AccessEngine`](crate::AccessEngine).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of remote calls in flight across the whole engine.
    /// Further calls queue until a slot frees up.
    pub max_in_flight: usize,

    /// Upper bound on a single remote call, after which it counts as a
    /// transport failure
    #[serde(with = "millis")]
    pub request_timeout: Duration,

    /// Retry of transport failures
    pub retry: RetryPolicy,

    /// Application data root, relative to the pod root. Walks start here
    /// unless told otherwise.
    pub data_root: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 12,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            data_root: "data/".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrency cap (at least one)
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Set the per-call timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the application data root
    pub fn with_data_root(mut self, data_root: impl Into<String>) -> Self {
        self.data_root = data_root.into();
        self
    }
}

/// Bounded retry with exponential backoff.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per call, the first one included
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(with = "millis")]
    pub base_delay: Duration,

    /// Cap on any single delay
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// The delay after the `attempt`-th failed attempt (counting from zero).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
