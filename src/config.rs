// Location: src/config.rs

use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::error::{SchedulerError, Result};

/// Environment variable holding the default batch size
pub const BATCH_SIZE_ENV: &str = "SERVICE_BATCH_SIZE";

/// Environment variable holding the evaluation interval, e.g. `30s`, `5m`, `1h`
pub const METRICS_SCHEDULE_ENV: &str = "SERVICE_METRICS_SCHEDULE";

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_METRICS_SCHEDULE: &str = "30s";

const FALLBACK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Batch size used when a model has no request-specific window
    pub batch_size: usize,

    /// Interval between periodic evaluation passes
    pub metrics_schedule: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            metrics_schedule: FALLBACK_INTERVAL,
        }
    }
}

impl ServiceConfig {
    /// Load the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let schedule = lookup(METRICS_SCHEDULE_ENV)
            .unwrap_or_else(|| DEFAULT_METRICS_SCHEDULE.to_string());

        let batch_size = match lookup(BATCH_SIZE_ENV) {
            Some(raw) => raw.trim().parse::<usize>().map_err(|e| {
                SchedulerError::Configuration {
                    message: format!("'{}' is not a valid batch size: {}", raw, e),
                    parameter: BATCH_SIZE_ENV.to_string(),
                }
            })?,
            None => DEFAULT_BATCH_SIZE,
        };

        let config = Self {
            batch_size,
            metrics_schedule: parse_schedule(&schedule)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SchedulerError::Configuration {
                message: "Batch size must be positive".to_string(),
                parameter: BATCH_SIZE_ENV.to_string(),
            });
        }

        if self.metrics_schedule.is_zero() {
            return Err(SchedulerError::Configuration {
                message: "Metrics schedule must be longer than zero".to_string(),
                parameter: METRICS_SCHEDULE_ENV.to_string(),
            });
        }

        Ok(())
    }
}

/// Parse a schedule string with an `s`, `m` or `h` suffix.
///
/// Any other suffix falls back to 30 seconds. A recognised suffix with a
/// non-numeric amount is a configuration error.
pub fn parse_schedule(raw: &str) -> Result<Duration> {
    let raw = raw.trim();

    let (amount, unit_secs) = if let Some(amount) = raw.strip_suffix('s') {
        (amount, 1)
    } else if let Some(amount) = raw.strip_suffix('m') {
        (amount, 60)
    } else if let Some(amount) = raw.strip_suffix('h') {
        (amount, 60 * 60)
    } else {
        return Ok(FALLBACK_INTERVAL);
    };

    let amount: u64 = amount.trim().parse().map_err(|e| SchedulerError::Configuration {
        message: format!("'{}' is not a valid schedule: {}", raw, e),
        parameter: METRICS_SCHEDULE_ENV.to_string(),
    })?;

    Ok(Duration::from_secs(amount * unit_secs))
}
