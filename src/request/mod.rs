//! Metric request payloads and their reconciliation against model schemas

mod reconcile;

pub use reconcile::{
    FieldRole, GroupFairnessParams, IdentityParams, Reconcilable, ReconcilableField,
    ReconcilableValue, RequestReconciler, SchemaReconciler,
};

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::{
    data::StorageMetadata,
    error::{SchedulerError, Result},
};

/// Label tags attached to a published series
pub type Tags = BTreeMap<String, String>;

/// Metric-specific parameters of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestKind {
    GroupFairness(GroupFairnessParams),
    Identity(IdentityParams),
}

impl Reconcilable for RequestKind {
    fn reconcile(&mut self, metadata: &StorageMetadata) -> Result<()> {
        match self {
            RequestKind::GroupFairness(params) => params.reconcile(metadata),
            RequestKind::Identity(params) => params.reconcile(metadata),
        }
    }
}

/// A standing registration to compute one metric for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRequest {
    pub model_id: String,
    pub metric_name: String,
    pub request_name: Option<String>,
    /// Number of most recent rows to evaluate
    pub batch_size: usize,
    pub kind: RequestKind,
}

impl MetricRequest {
    pub fn new(
        model_id: impl Into<String>,
        metric_name: impl Into<String>,
        batch_size: usize,
        kind: RequestKind,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            metric_name: metric_name.into(),
            request_name: None,
            batch_size,
            kind,
        }
    }

    pub fn with_request_name(mut self, name: impl Into<String>) -> Self {
        self.request_name = Some(name.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SchedulerError::reconciliation(
                &self.model_id,
                format!("batch size for {} must be positive", self.metric_name),
            ));
        }
        Ok(())
    }

    /// Tags shared by every request type
    pub fn default_tags(&self) -> Tags {
        let mut tags = Tags::new();
        if let Some(name) = &self.request_name {
            tags.insert("requestName".to_string(), name.clone());
        }
        tags.insert("metricName".to_string(), self.metric_name.clone());
        tags.insert("model".to_string(), self.model_id.clone());
        tags
    }

    /// Tags describing this request's parameters
    pub fn tags(&self) -> Tags {
        let mut tags = Tags::new();
        match &self.kind {
            RequestKind::GroupFairness(params) => {
                tags.insert(
                    "protected".to_string(),
                    params.protected_attribute.column_name().to_string(),
                );
                tags.insert(
                    "outcome".to_string(),
                    params.outcome_name.column_name().to_string(),
                );
                tags.insert("favorable_value".to_string(), params.favorable_outcome.to_tag());
                tags.insert("privileged".to_string(), params.privileged_attribute.to_tag());
                tags.insert("unprivileged".to_string(), params.unprivileged_attribute.to_tag());
            }
            RequestKind::Identity(params) => {
                tags.insert("column".to_string(), params.column_name.column_name().to_string());
            }
        }
        tags.insert("batch_size".to_string(), self.batch_size.to_string());
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn identity_request() -> MetricRequest {
        MetricRequest::new(
            "m1",
            "MEAN",
            25,
            RequestKind::Identity(IdentityParams {
                column_name: ReconcilableField::column("income"),
                lower_thresh: None,
                upper_thresh: Some(10.0),
            }),
        )
    }

    #[test]
    fn test_default_tags() {
        let request = identity_request();
        let tags = request.default_tags();
        assert_eq!(tags.get("model").map(String::as_str), Some("m1"));
        assert_eq!(tags.get("metricName").map(String::as_str), Some("MEAN"));
        assert!(!tags.contains_key("requestName"));

        let tags = request.with_request_name("nightly").default_tags();
        assert_eq!(tags.get("requestName").map(String::as_str), Some("nightly"));
    }

    #[test]
    fn test_kind_tags() {
        let tags = identity_request().tags();
        let expected: Tags = [("column", "income"), ("batch_size", "25")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(tags, expected);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut request = identity_request();
        request.batch_size = 0;
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_request_deserialization() {
        let raw = r#"{
            "modelId": "m1",
            "metricName": "SPD",
            "requestName": null,
            "batchSize": 50,
            "kind": {
                "type": "group_fairness",
                "protectedAttribute": {"name": "gender", "role": "feature"},
                "privilegedAttribute": {"raw": "male"},
                "unprivilegedAttribute": {"raw": "female"},
                "outcomeName": {"name": "approved", "role": "output"},
                "favorableOutcome": {"raw": true}
            }
        }"#;
        let request: MetricRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.batch_size, 50);
        assert!(matches!(request.kind, RequestKind::GroupFairness(_)));
        assert_eq!(request.tags().get("privileged").map(String::as_str), Some("male"));
    }
}
