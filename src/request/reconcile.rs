use serde::{Serialize, Deserialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    data::{DataSource, DataType, SchemaItem, StorageMetadata},
    error::{SchedulerError, Result},
};
use super::MetricRequest;

/// Which part of the model schema a field refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldRole {
    Feature,
    Output,
    /// Either a feature or an output; features take precedence
    Column,
}

/// Something that must be resolved against model metadata before use
pub trait Reconcilable {
    fn reconcile(&mut self, metadata: &StorageMetadata) -> Result<()>;
}

/// A symbolic column reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilableField {
    pub name: String,
    pub role: FieldRole,
    #[serde(skip)]
    column: Option<SchemaItem>,
}

impl ReconcilableField {
    pub fn feature(name: impl Into<String>) -> Self {
        Self::new(name, FieldRole::Feature)
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self::new(name, FieldRole::Output)
    }

    pub fn column(name: impl Into<String>) -> Self {
        Self::new(name, FieldRole::Column)
    }

    fn new(name: impl Into<String>, role: FieldRole) -> Self {
        Self {
            name: name.into(),
            role,
            column: None,
        }
    }

    /// The resolved schema column, once reconciled
    pub fn schema_item(&self) -> Option<&SchemaItem> {
        self.column.as_ref()
    }

    pub fn is_reconciled(&self) -> bool {
        self.column.is_some()
    }

    /// Concrete column name if reconciled, otherwise the symbolic name
    pub fn column_name(&self) -> &str {
        self.column
            .as_ref()
            .map(|item| item.name.as_str())
            .unwrap_or(&self.name)
    }

    fn data_type(&self) -> DataType {
        self.column
            .as_ref()
            .map(|item| item.data_type)
            .unwrap_or(DataType::Unknown)
    }
}

impl Reconcilable for ReconcilableField {
    fn reconcile(&mut self, metadata: &StorageMetadata) -> Result<()> {
        let item = match self.role {
            FieldRole::Feature => metadata.input_item(&self.name),
            FieldRole::Output => metadata.output_item(&self.name),
            FieldRole::Column => metadata
                .input_item(&self.name)
                .or_else(|| metadata.output_item(&self.name)),
        };

        let item = item.ok_or_else(|| {
            SchedulerError::reconciliation(
                &metadata.model_id,
                format!("no {:?} named '{}' in model schema", self.role, self.name),
            )
        })?;

        debug!(field = %self.name, column = %item, "field reconciled");
        self.column = Some(item.clone());
        Ok(())
    }
}

/// A raw value whose type is checked against the column it is compared with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilableValue {
    pub raw: Value,
    #[serde(skip)]
    data_type: Option<DataType>,
}

impl ReconcilableValue {
    pub fn new(raw: impl Into<Value>) -> Self {
        Self {
            raw: raw.into(),
            data_type: None,
        }
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.data_type
    }

    fn reconcile_against(&mut self, field: &ReconcilableField, model_id: &str) -> Result<()> {
        let data_type = field.data_type();
        if !data_type.accepts(&self.raw) {
            return Err(SchedulerError::reconciliation(
                model_id,
                format!(
                    "value {} does not match type {:?} of column '{}'",
                    self.raw,
                    data_type,
                    field.column_name()
                ),
            ));
        }
        self.data_type = Some(data_type);
        Ok(())
    }

    /// Tag-friendly rendering; strings are emitted without quotes
    pub fn to_tag(&self) -> String {
        match &self.raw {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Request parameters for group fairness metrics such as SPD or DIR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupFairnessParams {
    pub protected_attribute: ReconcilableField,
    pub privileged_attribute: ReconcilableValue,
    pub unprivileged_attribute: ReconcilableValue,
    pub outcome_name: ReconcilableField,
    pub favorable_outcome: ReconcilableValue,
}

impl Reconcilable for GroupFairnessParams {
    fn reconcile(&mut self, metadata: &StorageMetadata) -> Result<()> {
        let model_id = metadata.model_id.as_str();
        self.protected_attribute.reconcile(metadata)?;
        self.outcome_name.reconcile(metadata)?;
        self.privileged_attribute
            .reconcile_against(&self.protected_attribute, model_id)?;
        self.unprivileged_attribute
            .reconcile_against(&self.protected_attribute, model_id)?;
        self.favorable_outcome
            .reconcile_against(&self.outcome_name, model_id)
    }
}

/// Request parameters for metrics over a single column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityParams {
    pub column_name: ReconcilableField,
    pub lower_thresh: Option<f64>,
    pub upper_thresh: Option<f64>,
}

impl Reconcilable for IdentityParams {
    fn reconcile(&mut self, metadata: &StorageMetadata) -> Result<()> {
        self.column_name.reconcile(metadata)
    }
}

/// Resolves a request's symbolic references before it is scheduled
#[async_trait::async_trait]
pub trait RequestReconciler: Send + Sync {
    async fn reconcile(&self, request: &mut MetricRequest, source: &dyn DataSource) -> Result<()>;
}

/// Default reconciler resolving fields against the model's storage metadata
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaReconciler;

#[async_trait::async_trait]
impl RequestReconciler for SchemaReconciler {
    async fn reconcile(&self, request: &mut MetricRequest, source: &dyn DataSource) -> Result<()> {
        let metadata = source.get_metadata(&request.model_id).await.map_err(|e| {
            warn!(model_id = %request.model_id, error = %e, "metadata unavailable for reconciliation");
            SchedulerError::reconciliation(&request.model_id, e.to_string())
        })?;

        request.kind.reconcile(&metadata)?;
        info!(model_id = %request.model_id, metric = %request.metric_name, "reconciled request");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> StorageMetadata {
        StorageMetadata::new("m1")
            .with_input(SchemaItem::new(DataType::String, "gender", 0))
            .with_input(SchemaItem::new(DataType::Int32, "age", 1))
            .with_output(SchemaItem::new(DataType::Bool, "approved", 0))
            .with_alias("age", "customer_age")
    }

    fn fairness() -> GroupFairnessParams {
        GroupFairnessParams {
            protected_attribute: ReconcilableField::feature("gender"),
            privileged_attribute: ReconcilableValue::new("male"),
            unprivileged_attribute: ReconcilableValue::new("female"),
            outcome_name: ReconcilableField::output("approved"),
            favorable_outcome: ReconcilableValue::new(true),
        }
    }

    #[test]
    fn test_field_reconciliation_by_role() {
        let md = metadata();

        let mut field = ReconcilableField::feature("customer_age");
        field.reconcile(&md).unwrap();
        assert_eq!(field.column_name(), "age");
        assert_eq!(field.schema_item().unwrap().data_type, DataType::Int32);

        let mut field = ReconcilableField::feature("approved");
        assert!(matches!(
            field.reconcile(&md),
            Err(SchedulerError::Reconciliation { .. })
        ));
        assert!(!field.is_reconciled());

        let mut field = ReconcilableField::column("approved");
        field.reconcile(&md).unwrap();
        assert_eq!(field.schema_item().unwrap().column_index, 0);
    }

    #[test]
    fn test_reconciliation_is_idempotent() {
        let md = metadata();
        let mut params = fairness();
        params.reconcile(&md).unwrap();
        let first = params.clone();
        params.reconcile(&md).unwrap();
        assert_eq!(params, first);
        assert_eq!(params.favorable_outcome.data_type(), Some(DataType::Bool));
    }

    #[test]
    fn test_value_type_mismatch() {
        let mut params = fairness();
        params.favorable_outcome = ReconcilableValue::new(json!("yes"));
        assert!(matches!(
            params.reconcile(&metadata()),
            Err(SchedulerError::Reconciliation { .. })
        ));
    }

    #[test]
    fn test_value_tags() {
        assert_eq!(ReconcilableValue::new("male").to_tag(), "male");
        assert_eq!(ReconcilableValue::new(1).to_tag(), "1");
        assert_eq!(ReconcilableValue::new(true).to_tag(), "true");
    }
}
