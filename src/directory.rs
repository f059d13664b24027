//! Registry of metric calculators keyed by metric name

use std::sync::Arc;
use dashmap::{mapref::entry::Entry, DashMap};
use tracing::debug;

use crate::{
    data::DataFrame,
    error::Result,
    metrics::MetricValueCarrier,
    request::MetricRequest,
};

/// Computes one metric over a batch for a request
pub type Calculator =
    Arc<dyn Fn(&DataFrame, &MetricRequest) -> Result<MetricValueCarrier> + Send + Sync>;

#[derive(Default)]
pub struct MetricsDirectory {
    calculators: DashMap<String, Calculator>,
}

impl MetricsDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a calculator; the first registration for a name wins
    pub fn register<F>(&self, name: impl Into<String>, calculator: F) -> bool
    where
        F: Fn(&DataFrame, &MetricRequest) -> Result<MetricValueCarrier> + Send + Sync + 'static,
    {
        match self.calculators.entry(name.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                debug!(metric = %entry.key(), "registered calculator");
                entry.insert(Arc::new(calculator));
                true
            }
        }
    }

    pub fn get_calculator(&self, name: &str) -> Option<Calculator> {
        self.calculators.get(name).map(|entry| entry.value().clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.calculators.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{IdentityParams, ReconcilableField, RequestKind};

    fn request() -> MetricRequest {
        MetricRequest::new(
            "m1",
            "ROWS",
            10,
            RequestKind::Identity(IdentityParams {
                column_name: ReconcilableField::column("x"),
                lower_thresh: None,
                upper_thresh: None,
            }),
        )
    }

    #[test]
    fn test_register_and_lookup() {
        let directory = MetricsDirectory::new();
        assert!(directory.register("ROWS", |df: &DataFrame, _: &MetricRequest| {
            Ok(MetricValueCarrier::from(df.len() as f64))
        }));

        let calculator = directory.get_calculator("ROWS").unwrap();
        let df = DataFrame::new(vec!["x".to_string()]);
        assert_eq!(calculator(&df, &request()).unwrap(), MetricValueCarrier::Single(0.0));
        assert!(directory.get_calculator("SPD").is_none());
    }

    #[test]
    fn test_first_registration_wins() {
        let directory = MetricsDirectory::new();
        directory.register("ROWS", |_: &DataFrame, _: &MetricRequest| Ok(1.0.into()));
        assert!(!directory.register("ROWS", |_: &DataFrame, _: &MetricRequest| Ok(2.0.into())));

        let calculator = directory.get_calculator("ROWS").unwrap();
        let df = DataFrame::default();
        assert_eq!(calculator(&df, &request()).unwrap().value().unwrap(), 1.0);
        assert_eq!(directory.names(), vec!["ROWS"]);
    }
}
