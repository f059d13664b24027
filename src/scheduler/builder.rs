use std::collections::HashSet;
use std::sync::Arc;
use parking_lot::Mutex;

use crate::{
    config::ServiceConfig,
    data::DataSource,
    directory::MetricsDirectory,
    error::{Result, SchedulerError},
    metrics::GaugePublisher,
    request::{RequestReconciler, SchemaReconciler},
};

use super::requests::RequestTable;
use super::scheduler::MetricsScheduler;

/// Builder for constructing a MetricsScheduler instance
pub struct SchedulerBuilder {
    config: Option<ServiceConfig>,
    data_source: Option<Arc<dyn DataSource>>,
    directory: Option<Arc<MetricsDirectory>>,
    publisher: Option<Arc<GaugePublisher>>,
    reconciler: Option<Arc<dyn RequestReconciler>>,
}

impl SchedulerBuilder {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            config: None,
            data_source: None,
            directory: None,
            publisher: None,
            reconciler: None,
        }
    }

    /// Set the service configuration; defaults to the environment
    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_data_source(mut self, data_source: Arc<dyn DataSource>) -> Self {
        self.data_source = Some(data_source);
        self
    }

    pub fn with_directory(mut self, directory: Arc<MetricsDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<GaugePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_reconciler(mut self, reconciler: Arc<dyn RequestReconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Build the scheduler; a data source is required
    pub fn build(self) -> Result<MetricsScheduler> {
        let config = match self.config {
            Some(config) => config,
            None => ServiceConfig::from_env()?,
        };
        config.validate()?;

        let data_source = self.data_source.ok_or_else(|| SchedulerError::Configuration {
            message: "a data source is required".to_string(),
            parameter: "data_source".to_string(),
        })?;

        let publisher = match self.publisher {
            Some(publisher) => publisher,
            None => Arc::new(GaugePublisher::new()?),
        };

        Ok(MetricsScheduler {
            config: Arc::new(config),
            requests: RequestTable::new(),
            publisher,
            data_source,
            directory: self.directory.unwrap_or_default(),
            reconciler: self.reconciler.unwrap_or_else(|| Arc::new(SchemaReconciler)),
            skipped_models: Mutex::new(HashSet::new()),
            task: Mutex::new(None),
        })
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::data::InMemoryDataSource;

    #[test]
    fn test_builder_requires_data_source() {
        let result = SchedulerBuilder::default()
            .with_config(ServiceConfig::default())
            .build();
        assert!(matches!(result, Err(SchedulerError::Configuration { .. })));
    }

    #[test]
    fn test_builder_validation() {
        let config = ServiceConfig {
            batch_size: 0,
            metrics_schedule: Duration::from_secs(30),
        };
        let result = SchedulerBuilder::default()
            .with_config(config)
            .with_data_source(Arc::new(InMemoryDataSource::new()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_shares_components() {
        let directory = Arc::new(MetricsDirectory::new());
        let publisher = Arc::new(GaugePublisher::new().unwrap());
        let scheduler = SchedulerBuilder::default()
            .with_config(ServiceConfig::default())
            .with_data_source(Arc::new(InMemoryDataSource::new()))
            .with_directory(directory.clone())
            .with_publisher(publisher.clone())
            .build()
            .unwrap();

        assert!(Arc::ptr_eq(scheduler.directory(), &directory));
        assert!(Arc::ptr_eq(scheduler.publisher(), &publisher));
        assert_eq!(scheduler.config().batch_size, 100);
        assert!(!scheduler.is_scheduled());
    }
}
