use std::path::PathBuf;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use crate::error::{Result, SchedulerError};

static INIT: Once = Once::new();

/// Environment variable overriding the minimum log level
pub const LOG_LEVEL_ENV: &str = "SERVICE_LOG_LEVEL";

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level
    pub level: Level,
    /// Whether to include source code locations
    pub source_location: bool,
    /// Whether to log span open and close events
    pub log_spans: bool,
    /// Output file path (None for stdout)
    pub file_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            source_location: false,
            log_spans: false,
            file_path: None,
        }
    }
}

impl LogConfig {
    /// Read the log level from the environment, keeping the other defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(LOG_LEVEL_ENV) {
            config.level = raw.trim().parse().map_err(|_| SchedulerError::Configuration {
                message: format!("'{}' is not a log level", raw),
                parameter: LOG_LEVEL_ENV.to_string(),
            })?;
        }
        Ok(config)
    }
}

/// Install the global subscriber. Only the first call has any effect.
pub fn setup_logging(config: LogConfig) -> Result<()> {
    let mut result = Ok(());

    INIT.call_once(|| {
        result = setup_logging_internal(config);
    });

    result
}

fn setup_logging_internal(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_span_events(if config.log_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    let installed = match config.file_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| SchedulerError::Configuration {
                    message: format!("failed to open log file {}: {}", path.display(), e),
                    parameter: "file_path".to_string(),
                })?;
            subscriber
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
        }
        None => subscriber.try_init(),
    };

    installed.map_err(|e| SchedulerError::Configuration {
        message: format!("failed to set global subscriber: {}", e),
        parameter: "logging".to_string(),
    })
}
