use std::cell::Cell;
use std::collections::{btree_map::Entry, BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::{SchedulerError, Result},
    request::{MetricRequest, Tags},
};
use super::{ids::sub_series_id, MetricValueCarrier, METRIC_PREFIX};

/// Label carrying the originating request id on every series
pub const REQUEST_LABEL: &str = "request";
pub const MODEL_LABEL: &str = "model";
pub const SUBCATEGORY_LABEL: &str = "subcategory";

thread_local! {
    // While set, gathers on this thread leave our own families out
    static FOREIGN_ONLY: Cell<bool> = Cell::new(false);
}

/// One measurement to publish
#[derive(Debug, Clone, Copy)]
pub enum Sample<'a> {
    /// Scalar result of a registered request
    Request {
        request: &'a MetricRequest,
        value: f64,
    },
    /// Named results of a registered request, one series per name
    Named {
        request: &'a MetricRequest,
        values: &'a [(String, f64)],
    },
    /// Service-wide statistic that has no request object
    Global {
        metric_name: &'a str,
        value: f64,
    },
}

/// Full exposition name for a metric
pub fn full_metric_name(metric_name: &str) -> String {
    format!("{}{}", METRIC_PREFIX, metric_name.to_lowercase())
}

#[derive(Debug, Clone)]
struct Series {
    request_id: Uuid,
    labels: Tags,
    value: f64,
}

/// A labeled value about to be published
struct Point {
    value_id: Uuid,
    labels: Tags,
    value: f64,
}

/// All series published under one metric name
struct GaugeFamily {
    name: String,
    label_names: Vec<String>,
    vec: GaugeVec,
    /// value id -> series
    series: HashMap<Uuid, Series>,
}

impl GaugeFamily {
    fn new(name: &str, label_names: Vec<String>) -> Result<Self> {
        let names: Vec<&str> = label_names.iter().map(String::as_str).collect();
        let vec = GaugeVec::new(Opts::new(name, help_text(name)), &names)?;
        Ok(Self {
            name: name.to_string(),
            label_names,
            vec,
            series: HashMap::new(),
        })
    }

    fn label_values<'a>(&'a self, labels: &'a Tags) -> Vec<&'a str> {
        self.label_names
            .iter()
            .map(|name| labels.get(name).map(String::as_str).unwrap_or(""))
            .collect()
    }

    fn covers(&self, labels: &Tags) -> bool {
        labels.keys().all(|name| self.label_names.contains(name))
    }

    /// Rebuild with the union of label names, carrying every series over
    fn relabel(&mut self, labels: &Tags) -> Result<()> {
        let union: BTreeSet<String> = self
            .label_names
            .iter()
            .cloned()
            .chain(labels.keys().cloned())
            .collect();

        let mut rebuilt = GaugeFamily::new(&self.name, union.into_iter().collect())?;
        for (value_id, series) in self.series.drain() {
            rebuilt.set(value_id, series)?;
        }

        debug!(metric = %self.name, labels = ?rebuilt.label_names, "gauge family relabeled");
        *self = rebuilt;
        Ok(())
    }

    fn set(&mut self, value_id: Uuid, series: Series) -> Result<()> {
        if let Some(previous) = self.series.get(&value_id) {
            if previous.labels != series.labels {
                let stale = self.label_values(&previous.labels);
                let _ = self.vec.remove_label_values(&stale);
            }
        }

        self.vec
            .get_metric_with_label_values(&self.label_values(&series.labels))?
            .set(series.value);
        self.series.insert(value_id, series);
        Ok(())
    }

    fn remove(&mut self, value_id: &Uuid) {
        if let Some(series) = self.series.remove(value_id) {
            let values = self.label_values(&series.labels);
            if let Err(e) = self.vec.remove_label_values(&values) {
                debug!(metric = %self.name, error = %e, "series already absent");
            }
        }
    }

    /// Remove the request's series whose value id is not in `keep`
    fn retain_request(&mut self, request_id: Uuid, keep: &HashSet<Uuid>) -> Vec<Uuid> {
        let stale: Vec<Uuid> = self
            .series
            .iter()
            .filter(|(value_id, series)| series.request_id == request_id && !keep.contains(value_id))
            .map(|(value_id, _)| *value_id)
            .collect();

        for value_id in &stale {
            self.remove(value_id);
        }
        stale
    }
}

fn help_text(name: &str) -> String {
    format!("Model monitoring metric: {}", name)
}

#[derive(Default)]
struct PublisherState {
    families: BTreeMap<String, GaugeFamily>,
    /// Last value published for each value id, under any metric
    values: HashMap<Uuid, f64>,
}

/// Exposes every gauge family through a single registry collector
#[derive(Clone)]
struct FamilyCollector {
    state: Arc<Mutex<PublisherState>>,
}

impl Collector for FamilyCollector {
    fn desc(&self) -> Vec<&Desc> {
        // label sets change at runtime, so the collector stays unchecked
        Vec::new()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        if FOREIGN_ONLY.with(Cell::get) {
            return Vec::new();
        }

        let state = self.state.lock();
        state
            .families
            .values()
            .flat_map(|family| family.vec.collect())
            .collect()
    }
}

/// Publishes metric values as dynamically labeled Prometheus gauges
pub struct GaugePublisher {
    registry: Registry,
    state: Arc<Mutex<PublisherState>>,
}

impl GaugePublisher {
    /// Create a publisher with its own registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Create a publisher exposing its gauges through `registry`
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let state = Arc::new(Mutex::new(PublisherState::default()));
        registry.register(Box::new(FamilyCollector {
            state: state.clone(),
        }))?;

        Ok(Self { registry, state })
    }

    /// The registry scraped by the exposition endpoint
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Publish one measurement for `id`.
    ///
    /// Series of the same request under the same metric that this sample
    /// does not cover, such as sub-categories dropped since the last pass,
    /// are removed.
    pub fn gauge(&self, model_name: &str, id: Uuid, sample: Sample<'_>) -> Result<()> {
        let (name, points) = match sample {
            Sample::Request { request, value } => {
                let point = Point {
                    value_id: id,
                    labels: request_tags(request, id),
                    value,
                };
                (full_metric_name(&request.metric_name), vec![point])
            }
            Sample::Named { request, values } => {
                let points = values
                    .iter()
                    .enumerate()
                    .map(|(idx, (sub_name, value))| {
                        let mut labels = request_tags(request, id);
                        labels.insert(SUBCATEGORY_LABEL.to_string(), sub_name.clone());
                        Point {
                            value_id: sub_series_id(id, idx),
                            labels,
                            value: *value,
                        }
                    })
                    .collect();
                (full_metric_name(&request.metric_name), points)
            }
            Sample::Global { metric_name, value } => {
                let mut labels = Tags::new();
                if !model_name.is_empty() {
                    labels.insert(MODEL_LABEL.to_string(), model_name.to_string());
                }
                labels.insert(REQUEST_LABEL.to_string(), id.to_string());
                let point = Point {
                    value_id: id,
                    labels,
                    value,
                };
                (full_metric_name(metric_name), vec![point])
            }
        };

        self.publish(&name, id, points)?;
        debug!(metric = %name, request_id = %id, "published gauge");
        Ok(())
    }

    /// Publish a calculator result under the request's id
    pub fn publish_carrier(
        &self,
        model_name: &str,
        id: Uuid,
        request: &MetricRequest,
        carrier: &MetricValueCarrier,
    ) -> Result<()> {
        let sample = match carrier {
            MetricValueCarrier::Single(value) => Sample::Request {
                request,
                value: *value,
            },
            MetricValueCarrier::Named(values) => Sample::Named {
                request,
                values: values.as_slice(),
            },
        };
        self.gauge(model_name, id, sample)
    }

    /// Remove every series of `metric_name` whose request label is `id`
    pub fn remove_gauge(&self, metric_name: &str, id: Uuid) -> usize {
        let name = full_metric_name(metric_name);
        let mut state = self.state.lock();
        let state = &mut *state;

        let mut removed = 0;
        if let Some(family) = state.families.get_mut(&name) {
            let value_ids = family.retain_request(id, &HashSet::new());
            removed = value_ids.len();
            for value_id in value_ids {
                state.values.remove(&value_id);
            }
            if family.series.is_empty() {
                state.families.remove(&name);
            }
        }
        state.values.remove(&id);

        debug!(metric = %name, request_id = %id, removed, "removed gauges");
        removed
    }

    /// Last value published for a value id, under any metric
    pub fn value(&self, id: Uuid) -> Option<f64> {
        self.state.lock().values.get(&id).copied()
    }

    /// Current value of one series of `metric_name`
    pub fn series_value(&self, metric_name: &str, value_id: Uuid) -> Option<f64> {
        let state = self.state.lock();
        state
            .families
            .get(&full_metric_name(metric_name))
            .and_then(|family| family.series.get(&value_id))
            .map(|series| series.value)
    }

    /// Label sets currently published for a request under `metric_name`
    pub fn series_for(&self, metric_name: &str, id: Uuid) -> Vec<Tags> {
        let state = self.state.lock();
        state
            .families
            .get(&full_metric_name(metric_name))
            .map(|family| {
                family
                    .series
                    .values()
                    .filter(|series| series.request_id == id)
                    .map(|series| series.labels.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total number of series under `metric_name`
    pub fn series_count(&self, metric_name: &str) -> usize {
        self.state
            .lock()
            .families
            .get(&full_metric_name(metric_name))
            .map(|family| family.series.len())
            .unwrap_or(0)
    }

    /// Prometheus text exposition of the whole registry
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()).into())
    }

    fn publish(&self, name: &str, request_id: Uuid, points: Vec<Point>) -> Result<()> {
        // the registry is only touched outside the state lock; scrapes hold the
        // registry lock while collecting our families
        let exists = self.state.lock().families.contains_key(name);
        if !exists {
            self.evict_foreign_collector(name)?;
        }

        let mut state = self.state.lock();
        let state = &mut *state;

        let family = match state.families.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                if points.is_empty() {
                    return Ok(());
                }
                let label_names: BTreeSet<String> = points
                    .iter()
                    .flat_map(|point| point.labels.keys().cloned())
                    .collect();
                entry.insert(GaugeFamily::new(name, label_names.into_iter().collect())?)
            }
        };

        let mut keep = HashSet::with_capacity(points.len());
        for point in points {
            if !family.covers(&point.labels) {
                family.relabel(&point.labels)?;
            }
            let series = Series {
                request_id,
                labels: point.labels,
                value: point.value,
            };
            family.set(point.value_id, series)?;
            state.values.insert(point.value_id, point.value);
            keep.insert(point.value_id);
        }

        for value_id in family.retain_request(request_id, &keep) {
            state.values.remove(&value_id);
        }
        if family.series.is_empty() {
            state.families.remove(name);
        }
        Ok(())
    }

    /// Unregister collectors someone else registered under our metric name
    fn evict_foreign_collector(&self, name: &str) -> Result<()> {
        // a collector without const labels shares the stand-in's descriptor id
        let stand_in = Gauge::with_opts(Opts::new(name, help_text(name)))?;
        match self.registry.register(Box::new(stand_in.clone())) {
            Ok(()) => {
                let _ = self.registry.unregister(Box::new(stand_in));
            }
            Err(prometheus::Error::AlreadyReg) => {
                if self.registry.unregister(Box::new(stand_in)).is_ok() {
                    warn!(metric = %name, "replaced foreign collector with a gauge");
                }
            }
            // other label dimensions; matched against live samples below
            Err(_) => {}
        }

        let Some(family) = self.gather_foreign(name) else {
            return Ok(());
        };

        for metric in family.get_metric() {
            let const_labels: HashMap<String, String> = metric
                .get_label()
                .iter()
                .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
                .collect();
            let stand_in = Gauge::with_opts(Opts::new(name, help_text(name)).const_labels(const_labels))?;
            if self.registry.unregister(Box::new(stand_in)).is_ok() {
                warn!(metric = %name, "replaced foreign collector with a gauge");
            }
        }

        if self.gather_foreign(name).is_some() {
            warn!(metric = %name, "foreign collector could not be replaced");
            return Err(SchedulerError::Registry(prometheus::Error::Msg(format!(
                "{} is exposed by a collector this publisher does not own",
                name
            ))));
        }
        Ok(())
    }

    /// The family `name` as exposed by every collector except ours
    fn gather_foreign(&self, name: &str) -> Option<MetricFamily> {
        FOREIGN_ONLY.with(|flag| flag.set(true));
        let families = self.registry.gather();
        FOREIGN_ONLY.with(|flag| flag.set(false));

        families.into_iter().find(|family| family.get_name() == name)
    }
}

fn request_tags(request: &MetricRequest, id: Uuid) -> Tags {
    let mut tags = request.default_tags();
    tags.extend(request.tags());
    tags.insert(REQUEST_LABEL.to_string(), id.to_string());
    tags
}
