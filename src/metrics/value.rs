use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::error::{SchedulerError, Result};

/// Named sub-results in the order the calculator produced them
pub type NamedValues = Vec<(String, f64)>;

/// Result of a single metric calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricValueCarrier {
    /// One scalar value
    Single(f64),
    /// One value per named sub-category
    Named(NamedValues),
}

impl MetricValueCarrier {
    pub fn is_single(&self) -> bool {
        matches!(self, MetricValueCarrier::Single(_))
    }

    /// Get the scalar value
    pub fn value(&self) -> Result<f64> {
        match self {
            MetricValueCarrier::Single(value) => Ok(*value),
            MetricValueCarrier::Named(_) => Err(SchedulerError::InvalidAccess(
                "metric value is not singular and must be accessed via named_values()".to_string(),
            )),
        }
    }

    /// Get the named values
    pub fn named_values(&self) -> Result<&[(String, f64)]> {
        match self {
            MetricValueCarrier::Named(values) => Ok(values),
            MetricValueCarrier::Single(_) => Err(SchedulerError::InvalidAccess(
                "metric value is singular and must be accessed via value()".to_string(),
            )),
        }
    }
}

impl From<f64> for MetricValueCarrier {
    fn from(value: f64) -> Self {
        MetricValueCarrier::Single(value)
    }
}

impl From<NamedValues> for MetricValueCarrier {
    fn from(values: NamedValues) -> Self {
        MetricValueCarrier::Named(values)
    }
}

impl From<BTreeMap<String, f64>> for MetricValueCarrier {
    fn from(values: BTreeMap<String, f64>) -> Self {
        MetricValueCarrier::Named(values.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_value() {
        let carrier = MetricValueCarrier::from(0.25);
        assert!(carrier.is_single());
        assert_eq!(carrier.value().unwrap(), 0.25);
        assert!(matches!(
            carrier.named_values(),
            Err(SchedulerError::InvalidAccess(_))
        ));
    }

    #[test]
    fn test_named_values_keep_order() {
        let values = vec![
            ("zeta".to_string(), 1.0),
            ("alpha".to_string(), 2.0),
        ];
        let carrier = MetricValueCarrier::from(values.clone());
        assert!(!carrier.is_single());
        assert_eq!(carrier.named_values().unwrap(), values.as_slice());
        assert!(matches!(carrier.value(), Err(SchedulerError::InvalidAccess(_))));
    }

    #[test]
    fn test_from_btree_map() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), 0.5);
        map.insert("a".to_string(), 1.5);
        let carrier = MetricValueCarrier::from(map);
        let names: Vec<&str> = carrier
            .named_values()
            .unwrap()
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
