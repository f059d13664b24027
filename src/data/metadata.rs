use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};
use serde_json::Value;

/// Column data types known to the storage layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Bool,
    Float,
    Double,
    Int32,
    Int64,
    String,
    Tensor,
    Map,
    Unknown,
}

impl DataType {
    /// Whether a raw JSON value can be stored in a column of this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            DataType::Bool => value.is_boolean(),
            DataType::Float | DataType::Double => value.is_number(),
            DataType::Int32 | DataType::Int64 => value.is_i64() || value.is_u64(),
            DataType::String => value.is_string(),
            DataType::Tensor => value.is_array(),
            DataType::Map => value.is_object(),
            DataType::Unknown => true,
        }
    }
}

/// One column of a model input or output schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaItem {
    pub data_type: DataType,
    pub name: String,
    pub column_index: usize,
}

impl SchemaItem {
    pub fn new(data_type: DataType, name: impl Into<String>, column_index: usize) -> Self {
        Self {
            data_type,
            name: name.into(),
            column_index,
        }
    }
}

impl fmt::Display for SchemaItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SchemaItem(type={:?}, name='{}', column_index={})",
            self.data_type, self.name, self.column_index
        )
    }
}

/// Storage-level description of one model's recorded data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageMetadata {
    pub model_id: String,

    /// Number of stored observations
    pub observations: usize,

    /// Whether inference data has been recorded for this model
    pub recorded_inferences: bool,

    /// Input columns keyed by name
    pub input_schema: BTreeMap<String, SchemaItem>,

    /// Output columns keyed by name
    pub output_schema: BTreeMap<String, SchemaItem>,

    /// Original column name to display alias
    pub joint_name_aliases: BTreeMap<String, String>,

    pub input_tensor_name: String,
    pub output_tensor_name: String,
}

impl StorageMetadata {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            observations: 0,
            recorded_inferences: false,
            input_schema: BTreeMap::new(),
            output_schema: BTreeMap::new(),
            joint_name_aliases: BTreeMap::new(),
            input_tensor_name: "input".to_string(),
            output_tensor_name: "output".to_string(),
        }
    }

    pub fn with_input(mut self, item: SchemaItem) -> Self {
        self.input_schema.insert(item.name.clone(), item);
        self
    }

    pub fn with_output(mut self, item: SchemaItem) -> Self {
        self.output_schema.insert(item.name.clone(), item);
        self
    }

    pub fn with_alias(mut self, original: impl Into<String>, alias: impl Into<String>) -> Self {
        self.joint_name_aliases.insert(original.into(), alias.into());
        self
    }

    /// Map an alias back to its original column name; other names pass through
    pub fn resolve_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.joint_name_aliases
            .iter()
            .find(|(_, alias)| alias.as_str() == name)
            .map(|(original, _)| original.as_str())
            .unwrap_or(name)
    }

    pub fn input_item(&self, name: &str) -> Option<&SchemaItem> {
        self.input_schema.get(self.resolve_name(name))
    }

    pub fn output_item(&self, name: &str) -> Option<&SchemaItem> {
        self.output_schema.get(self.resolve_name(name))
    }
}
