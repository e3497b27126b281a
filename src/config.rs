use std::time::Duration;

use anyhow::Context as _;

use crate::driver::DriverConfig;
use crate::poll::PollPolicy;

pub const POLL_INTERVAL_ENV: &str = "FACILITY_CHECK_POLL_INTERVAL_MS";
pub const POLL_MAX_TRIALS_ENV: &str = "FACILITY_CHECK_POLL_MAX_TRIALS";

/// Poll settings resolved from CLI flags, then the environment, then defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOverrides {
    pub interval_ms: Option<u64>,
    pub max_trials: Option<u32>,
}

impl PollOverrides {
    pub fn from_env() -> anyhow::Result<Self> {
        let interval_ms = match std::env::var(POLL_INTERVAL_ENV) {
            Ok(raw) => parse_interval_ms(&raw)
                .with_context(|| format!("invalid {POLL_INTERVAL_ENV}={raw:?}"))?,
            Err(_) => None,
        };
        let max_trials = match std::env::var(POLL_MAX_TRIALS_ENV) {
            Ok(raw) => parse_max_trials(&raw)
                .with_context(|| format!("invalid {POLL_MAX_TRIALS_ENV}={raw:?}"))?,
            Err(_) => None,
        };
        Ok(Self {
            interval_ms,
            max_trials,
        })
    }

    /// `self` wins over `fallback` field by field.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            interval_ms: self.interval_ms.or(fallback.interval_ms),
            max_trials: self.max_trials.or(fallback.max_trials),
        }
    }

    pub fn apply(self, policy: PollPolicy) -> PollPolicy {
        PollPolicy {
            interval: self
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(policy.interval),
            max_trials: self.max_trials.unwrap_or(policy.max_trials),
        }
    }

    pub fn driver_config(self) -> DriverConfig {
        let defaults = DriverConfig::default();
        DriverConfig {
            venue_list: self.apply(defaults.venue_list),
            results: self.apply(defaults.results),
            layout: defaults.layout,
        }
    }
}

/// Empty means unset.
pub fn parse_interval_ms(raw: &str) -> anyhow::Result<Option<u64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let ms = raw
        .parse::<u64>()
        .with_context(|| format!("poll interval must be milliseconds: {raw}"))?;
    Ok(Some(ms))
}

/// Empty means unset; zero is rejected.
pub fn parse_max_trials(raw: &str) -> anyhow::Result<Option<u32>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let trials = raw
        .parse::<u32>()
        .with_context(|| format!("max trials must be a positive integer: {raw}"))?;
    if trials == 0 {
        anyhow::bail!("max trials must be at least 1");
    }
    Ok(Some(trials))
}
