//! Exponential backoff for transient dispatch failures.
//!
//! Retries are persisted scheduling data: a failed lead gets a new
//! `next_action_at` computed here and is picked up again by a later tick.
//! Nothing sleeps in-process.
//!
//! - Default: 300s base doubling per failure (300s, 600s, 1200s, ...)
//! - Capped at 24h

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Backoff settings, loaded from `orchestrator.backoff` in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay after the first transient failure.
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,

    /// Upper bound on any single delay.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
}

fn default_base_delay() -> u64 {
    300
}

fn default_max_delay() -> u64 {
    24 * 3600
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
        }
    }
}

impl BackoffConfig {
    /// Delay for a lead that has already failed `retry_count` times before
    /// the current failure: `base * 2^retry_count`, capped at `max_delay`.
    pub fn delay_for(&self, retry_count: u32) -> u64 {
        let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        self.base_delay_secs
            .saturating_mul(factor)
            .min(self.max_delay_secs)
    }
}

/// When the next attempt may run.
pub fn next_retry_at(now: DateTime<Utc>, retry_count: u32, cfg: &BackoffConfig) -> DateTime<Utc> {
    let secs = cfg.delay_for(retry_count).min(i64::MAX as u64) as i64;
    now.checked_add_signed(Duration::seconds(secs))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_from_base() {
        let cfg = BackoffConfig::default();
        let now = Utc::now();
        assert_eq!(next_retry_at(now, 0, &cfg) - now, Duration::seconds(300));
        assert_eq!(next_retry_at(now, 1, &cfg) - now, Duration::seconds(600));
        assert_eq!(next_retry_at(now, 2, &cfg) - now, Duration::seconds(1200));
    }

    #[test]
    fn delay_is_capped_at_max() {
        let cfg = BackoffConfig::default();
        assert_eq!(cfg.delay_for(9), 86_400);
        assert_eq!(cfg.delay_for(63), 86_400);
        assert_eq!(cfg.delay_for(64), 86_400);
        assert_eq!(cfg.delay_for(u32::MAX), 86_400);
    }

    #[test]
    fn delays_are_monotonic() {
        let cfg = BackoffConfig {
            base_delay_secs: 7,
            max_delay_secs: 10_000,
        };
        let mut prev = 0;
        for n in 0..80 {
            let d = cfg.delay_for(n);
            assert!(d >= prev, "delay for {n} ({d}) < previous ({prev})");
            assert!(d <= cfg.max_delay_secs);
            prev = d;
        }
    }
}
