//! Exponential backoff for step retry scheduling.
//!
//! Delays grow as `base × multiplier^retry_count`, capped at the configured
//! maximum. Jitter is deterministic per (step, attempt) so restarts do not
//! reshuffle scheduled retries.

use crate::config::BackoffConfig;
use std::hash::{Hash, Hasher};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
}

impl BackoffPolicy {
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_ms),
            max: Duration::from_millis(config.max_ms),
            multiplier: config.multiplier,
            jitter: config.jitter,
        }
    }

    /// Delay before the given retry (1 = first retry). `seed` feeds the
    /// deterministic jitter; callers pass a stable per-step value.
    pub fn delay_for(&self, retry_count: u32, seed: u64) -> Duration {
        let exponent = retry_count.min(32) as i32;
        let scaled = self.base.as_millis() as f64 * self.multiplier.powi(exponent);
        let mut millis = scaled.min(self.max.as_millis() as f64) as u64;

        if self.jitter && millis > 0 {
            // Up to ±25%, derived from (seed, retry_count)
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            (seed, retry_count).hash(&mut hasher);
            let spread = millis / 2;
            let offset = hasher.finish() % (spread + 1);
            millis = millis - spread / 2 + offset;
        }

        Duration::from_millis(millis.min(self.max.as_millis() as u64))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}
