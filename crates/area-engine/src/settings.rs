// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use area_config::EngineConfig;

/// Runtime knobs of the engine, in typed units.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub tick: Duration,
    pub workers: usize,
    pub queue_capacity: usize,
    /// Consecutive failures before suspension. Never below 2, so a single
    /// failure cannot suspend an Area.
    pub failure_threshold: u32,
    pub lease_ttl: Duration,
    pub provider_timeout: Duration,
    pub min_interval: Duration,
    pub max_delivery_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Deliveries retried per sweep.
    pub retry_batch_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            tick: Duration::from_secs(config.tick_secs.max(1)),
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
            failure_threshold: config.failure_threshold.max(2),
            lease_ttl: Duration::from_secs(config.lease_ttl_secs),
            provider_timeout: Duration::from_secs(config.provider_timeout_secs),
            min_interval: Duration::from_secs(config.min_interval_secs),
            max_delivery_attempts: config.max_delivery_attempts.max(1),
            backoff_base: Duration::from_secs(config.backoff_base_secs),
            backoff_max: Duration::from_secs(config.backoff_max_secs),
            retry_batch_size: config.queue_capacity.max(1),
        }
    }
}

impl EngineSettings {
    /// Delay before retry number `attempts + 1`: `min(base * 2^(attempts-1), max)`.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.backoff_base
            .checked_mul(1u32 << exponent)
            .map_or(self.backoff_max, |d| d.min(self.backoff_max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let settings = EngineSettings {
            backoff_base: Duration::from_secs(30),
            backoff_max: Duration::from_secs(3600),
            ..Default::default()
        };
        assert_eq!(settings.backoff(1), Duration::from_secs(30));
        assert_eq!(settings.backoff(2), Duration::from_secs(60));
        assert_eq!(settings.backoff(4), Duration::from_secs(240));
        assert_eq!(settings.backoff(8), Duration::from_secs(3600));
        assert_eq!(settings.backoff(200), Duration::from_secs(3600));
    }

    #[test]
    fn threshold_never_allows_first_failure_suspension() {
        let config = EngineConfig {
            failure_threshold: 1,
            ..Default::default()
        };
        assert_eq!(EngineSettings::from(&config).failure_threshold, 2);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn backoff_is_monotonic_and_capped(
                base in 0u64..10_000,
                max in 0u64..1_000_000,
                attempts in 0u32..1_000,
            ) {
                let settings = EngineSettings {
                    backoff_base: Duration::from_secs(base),
                    backoff_max: Duration::from_secs(max),
                    ..Default::default()
                };
                let delay = settings.backoff(attempts);
                prop_assert!(delay <= settings.backoff_max);
                prop_assert!(delay <= settings.backoff(attempts.saturating_add(1)));
            }
        }
    }
}
