//! Metric values and their publication as Prometheus gauges

mod ids;
mod publisher;
mod value;

pub use ids::{name_uuid_from_bytes, sub_series_id};
pub use publisher::{full_metric_name, GaugePublisher, Sample, MODEL_LABEL, REQUEST_LABEL, SUBCATEGORY_LABEL};
pub use value::{MetricValueCarrier, NamedValues};

/// Prefix of every exposed metric name
pub const METRIC_PREFIX: &str = "model_monitor_";

// Service-wide statistics published on every pass
pub(crate) const MODEL_COUNT_TOTAL: &str = "MODEL_COUNT_TOTAL";
pub(crate) const MODEL_OBSERVATIONS_TOTAL: &str = "MODEL_OBSERVATIONS_TOTAL";
pub(crate) const MODEL_COUNT_ID_SEED: &str = "model_count";
