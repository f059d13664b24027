use std::collections::HashSet;
use std::sync::{Arc, Weak};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::ServiceConfig,
    data::DataSource,
    directory::MetricsDirectory,
    error::{ErrorExt, Result, SchedulerError},
    metrics::{
        name_uuid_from_bytes, GaugePublisher, Sample, MODEL_COUNT_ID_SEED, MODEL_COUNT_TOTAL,
        MODEL_OBSERVATIONS_TOTAL,
    },
    request::{MetricRequest, RequestReconciler},
};

use super::builder::SchedulerBuilder;
use super::requests::{RequestEntry, RequestTable};

/// Handle to the running periodic task
pub(super) struct PeriodicTask {
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

/// Evaluates registered metric requests and publishes their results
pub struct MetricsScheduler {
    pub(super) config: Arc<ServiceConfig>,
    pub(super) requests: RequestTable,
    pub(super) publisher: Arc<GaugePublisher>,
    pub(super) data_source: Arc<dyn DataSource>,
    pub(super) directory: Arc<MetricsDirectory>,
    pub(super) reconciler: Arc<dyn RequestReconciler>,
    /// Models already reported as having no recorded inferences
    pub(super) skipped_models: Mutex<HashSet<String>>,
    pub(super) task: Mutex<Option<PeriodicTask>>,
}

impl MetricsScheduler {
    /// Create a new scheduler builder
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn requests(&self) -> &RequestTable {
        &self.requests
    }

    pub fn publisher(&self) -> &Arc<GaugePublisher> {
        &self.publisher
    }

    pub fn directory(&self) -> &Arc<MetricsDirectory> {
        &self.directory
    }

    /// Validate and reconcile `request`, then store it under `metric_name`.
    ///
    /// Nothing is stored when reconciliation fails. Registering an existing
    /// id replaces the previous request.
    pub async fn register(&self, metric_name: &str, id: Uuid, mut request: MetricRequest) -> Result<()> {
        request.validate()?;

        if let Err(e) = self.reconciler.reconcile(&mut request, self.data_source.as_ref()).await {
            warn!(metric = %metric_name, request_id = %id, error = %e, "rejected metric request");
            return Err(e);
        }

        info!(
            metric = %metric_name,
            request_id = %id,
            model = %request.model_id,
            batch_size = request.batch_size,
            "registered metric request"
        );
        self.requests.register(metric_name, id, Arc::new(request));
        Ok(())
    }

    /// Remove a request and every gauge published for it.
    ///
    /// Returns whether the request was registered. Gauges are removed either
    /// way.
    pub fn delete(&self, metric_name: &str, id: Uuid) -> bool {
        let removed = self.requests.delete(metric_name, id);
        let mut series = self.publisher.remove_gauge(metric_name, id);

        if let Some(request) = &removed {
            if !request.metric_name.eq_ignore_ascii_case(metric_name) {
                series += self.publisher.remove_gauge(&request.metric_name, id);
            }
        }

        info!(metric = %metric_name, request_id = %id, series, found = removed.is_some(), "deleted metric request");
        removed.is_some()
    }

    /// Run one evaluation pass, logging instead of returning errors
    pub async fn calculate(&self) {
        // errors are logged by calculate_manual
        let _ = self.calculate_manual(false).await;
    }

    /// Run one evaluation pass.
    ///
    /// The first error aborts the pass. It is returned when `throw_errors`
    /// is set and only logged otherwise.
    pub async fn calculate_manual(&self, throw_errors: bool) -> Result<()> {
        match self.run_pass().await {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_recoverable() {
                    warn!(error = %e, "metric evaluation pass failed");
                } else {
                    error!(error = %e, "metric evaluation pass failed");
                }
                if throw_errors {
                    Err(e)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Start the periodic evaluation task.
    ///
    /// Returns false if a task is already running. The task stops when
    /// [`MetricsScheduler::stop`] is called or the scheduler is dropped.
    /// Must be called from within a Tokio runtime.
    pub fn schedule(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().map_or(false, |t| !t.handle.is_finished()) {
            debug!("periodic metric evaluation already scheduled");
            return false;
        }

        let period = self.config.metrics_schedule;
        let scheduler: Weak<Self> = Arc::downgrade(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        debug!("periodic metric evaluation received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(scheduler) = scheduler.upgrade() else {
                            break;
                        };
                        scheduler.calculate().await;
                    }
                }
            }
        });

        info!(period = ?period, "scheduled periodic metric evaluation");
        *task = Some(PeriodicTask {
            handle,
            shutdown: shutdown_tx,
        });
        true
    }

    pub fn is_scheduled(&self) -> bool {
        self.task.lock().as_ref().map_or(false, |t| !t.handle.is_finished())
    }

    /// Stop the periodic task; a pass in progress runs to completion
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            if task.shutdown.send(()).is_err() {
                task.handle.abort();
            }
            info!("stopped periodic metric evaluation");
        }
    }

    /// Whether the no-inference skip has been reported for `model_id`
    pub fn has_logged_skip(&self, model_id: &str) -> bool {
        self.skipped_models.lock().contains(model_id)
    }

    async fn run_pass(&self) -> Result<()> {
        let snapshot = self.requests.snapshot();
        let requested: HashSet<&str> = snapshot
            .iter()
            .map(|entry| entry.request.model_id.as_str())
            .collect();

        let verified = self.data_source.get_verified_models().await?;
        debug!(models = verified.len(), requests = snapshot.len(), "starting metric evaluation pass");

        self.publisher.gauge(
            "",
            name_uuid_from_bytes(MODEL_COUNT_ID_SEED),
            Sample::Global {
                metric_name: MODEL_COUNT_TOTAL,
                value: verified.len() as f64,
            },
        )?;

        for model_id in &verified {
            let observations = self.data_source.get_num_observations(model_id).await?;
            self.publisher.gauge(
                model_id,
                name_uuid_from_bytes(model_id),
                Sample::Global {
                    metric_name: MODEL_OBSERVATIONS_TOTAL,
                    value: observations as f64,
                },
            )?;

            if !self.data_source.has_recorded_inferences(model_id).await? {
                self.log_skipped(model_id);
                continue;
            }

            if !requested.contains(model_id.as_str()) {
                continue;
            }

            let entries: Vec<&RequestEntry> = snapshot
                .iter()
                .filter(|entry| entry.request.model_id == *model_id)
                .collect();
            self.evaluate_model(model_id, &entries).await?;
        }

        Ok(())
    }

    async fn evaluate_model(&self, model_id: &str, entries: &[&RequestEntry]) -> Result<()> {
        let max_batch_size = entries
            .iter()
            .map(|entry| entry.request.batch_size)
            .max()
            .unwrap_or(self.config.batch_size);

        let df = self.data_source.get_organic_dataframe(model_id, max_batch_size).await?;
        debug!(model = %model_id, rows = df.len(), max_batch_size, "fetched organic data");

        for entry in entries {
            let request: &MetricRequest = &entry.request;
            let batch = df.tail(request.batch_size.min(df.len()));

            let Some(calculator) = self.directory.get_calculator(&request.metric_name) else {
                let e = SchedulerError::CalculatorNotFound {
                    metric_name: request.metric_name.clone(),
                };
                warn!(request_id = %entry.id, model = %model_id, error = %e, "skipping request");
                continue;
            };

            let carrier = calculator(&batch, request).map_err(|e| match e {
                SchedulerError::Calculation { .. } => e,
                other => SchedulerError::Calculation {
                    metric_name: request.metric_name.clone(),
                    request_id: entry.id,
                    message: other.to_string(),
                },
            })?;

            let published = self.requests.if_registered(&entry.metric_name, entry.id, || {
                self.publisher.publish_carrier(model_id, entry.id, request, &carrier)
            });
            match published {
                Some(result) => result?,
                None => debug!(request_id = %entry.id, "request deleted during pass, result dropped"),
            }
        }

        Ok(())
    }

    fn log_skipped(&self, model_id: &str) {
        if self.skipped_models.lock().insert(model_id.to_string()) {
            info!(model = %model_id, "skipping metric calculation, no recorded inferences");
        }
    }
}

impl Drop for MetricsScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.handle.abort();
        }
    }
}
