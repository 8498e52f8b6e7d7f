//! Backoff policy: decides how long to wait after a failed poll.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay before re-polling after consecutive broker errors.
///
/// The default is `immediate()`: the loop re-polls at once. A non-zero base
/// gives exponential backoff capped at `max_delay` (60s unless configured).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay for the first retry.
    #[serde(with = "millis")]
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }

    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier: 2.0,
            max_delay,
        }
    }

    /// Delay for the next poll.
    ///
    /// # Arguments
    /// * `failures` - consecutive failed polls so far (1-indexed). 0 means no wait.
    ///
    /// delay = min(base_delay * multiplier^(failures - 1), max_delay)
    pub fn next_delay(&self, failures: u32) -> Duration {
        if failures == 0 || self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let base_secs = self.base_delay.as_secs_f64();
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        // a multiplier below zero would give negative delays
        let delay_secs = (base_secs * self.multiplier.powi(exponent)).max(0.0);
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
