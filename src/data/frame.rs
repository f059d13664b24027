use serde::{Serialize, Deserialize};
use serde_json::Value;

/// Metadata column flagging synthetic (unlabeled) rows
pub const UNLABELED_TAG: &str = "_unlabeled";

static NULL: Value = Value::Null;

/// A row-oriented batch of model inputs, outputs and metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl DataFrame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a frame from rows; rows shorter than the column list are padded with nulls
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let mut frame = Self::new(columns);
        for row in rows {
            frame.push_row(row);
        }
        frame
    }

    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, in row order. Short rows read as null.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row.get(idx).unwrap_or(&NULL)).collect())
    }

    /// The last `n` rows
    pub fn tail(&self, n: usize) -> DataFrame {
        let start = self.rows.len().saturating_sub(n);
        Self {
            columns: self.columns.clone(),
            rows: self.rows[start..].to_vec(),
        }
    }

    /// Drop rows whose unlabeled tag is `true`
    pub fn organic(&self) -> DataFrame {
        let Some(idx) = self.column_index(UNLABELED_TAG) else {
            return self.clone();
        };

        Self {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| row.get(idx) != Some(&Value::Bool(true)))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(n: i64) -> DataFrame {
        DataFrame::from_rows(
            vec!["x".to_string(), UNLABELED_TAG.to_string()],
            (0..n).map(|i| vec![json!(i), json!(i % 3 == 0)]).collect(),
        )
    }

    #[test]
    fn test_tail() {
        let df = frame(10);
        let tail = df.tail(3);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail.column("x").unwrap(), vec![&json!(7), &json!(8), &json!(9)]);

        assert_eq!(df.tail(50).len(), 10);
        assert!(df.tail(0).is_empty());
    }

    #[test]
    fn test_organic_filter() {
        let df = frame(6);
        let organic = df.organic();
        assert_eq!(
            organic.column("x").unwrap(),
            vec![&json!(1), &json!(2), &json!(4), &json!(5)]
        );
    }

    #[test]
    fn test_short_rows_are_padded() {
        let df = DataFrame::from_rows(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![json!(1)]],
        );
        assert_eq!(df.rows()[0], vec![json!(1), Value::Null]);
        assert!(df.column("missing").is_none());
    }

    #[test]
    fn test_short_rows_from_json() {
        let df: DataFrame = serde_json::from_value(json!({
            "columns": ["x", UNLABELED_TAG],
            "rows": [[1, false], [2], [], [4, true]]
        }))
        .unwrap();

        assert_eq!(
            df.column("x").unwrap(),
            vec![&json!(1), &json!(2), &Value::Null, &json!(4)]
        );
        let organic = df.organic();
        assert_eq!(organic.len(), 3);
        assert_eq!(organic.column(UNLABELED_TAG).unwrap()[1], &Value::Null);
    }
}
