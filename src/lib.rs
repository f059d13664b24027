//! Metric Scheduler - periodic evaluation and publication of model monitoring metrics
//!
//! This crate keeps a table of standing metric requests per model, evaluates
//! them on a fixed interval against the latest recorded inference data, and
//! exposes the results as dynamically labeled Prometheus gauges.

use std::fmt;

// Public modules
pub mod config;
pub mod data;
pub mod directory;
pub mod error;
pub mod metrics;
pub mod request;
pub mod scheduler;
pub mod utils;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const MIN_RUST_VERSION: &str = "1.70.0";

// Re-exports for public API
pub use config::ServiceConfig;
pub use data::{DataFrame, DataSource, InMemoryDataSource, StorageMetadata};
pub use directory::{Calculator, MetricsDirectory};
pub use error::{Result, SchedulerError};
pub use metrics::{GaugePublisher, MetricValueCarrier, Sample};
pub use request::{MetricRequest, RequestKind, RequestReconciler, SchemaReconciler};
pub use scheduler::{MetricsScheduler, RequestTable, SchedulerBuilder};

/// Point-in-time summary of a scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerInfo {
    /// Number of registered requests
    pub requests: usize,
    /// Metrics with a registered calculator
    pub calculators: Vec<String>,
    /// Whether the periodic task is running
    pub scheduled: bool,
}

impl SchedulerInfo {
    pub fn collect(scheduler: &MetricsScheduler) -> Self {
        Self {
            requests: scheduler.requests().len(),
            calculators: scheduler.directory().names(),
            scheduled: scheduler.is_scheduled(),
        }
    }
}

impl fmt::Display for SchedulerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Registered requests: {}", self.requests)?;
        writeln!(f, "Calculators: {}", self.calculators.join(", "))?;
        writeln!(f, "Scheduled: {}", if self.scheduled { "yes" } else { "no" })
    }
}
