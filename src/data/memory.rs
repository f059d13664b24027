use std::collections::HashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::{SchedulerError, Result};
use super::{DataFrame, DataSource, StorageMetadata, UNLABELED_TAG};

#[derive(Debug, Clone)]
struct ModelStore {
    metadata: StorageMetadata,
    frame: DataFrame,
}

/// In-process data source holding one frame per model
#[derive(Debug, Default)]
pub struct InMemoryDataSource {
    models: RwLock<HashMap<String, ModelStore>>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a model with its metadata and stored rows
    pub fn insert_model(&self, metadata: StorageMetadata, frame: DataFrame) {
        let model_id = metadata.model_id.clone();
        let mut store = ModelStore { metadata, frame };
        store.metadata.observations = store.frame.len();
        store.metadata.recorded_inferences =
            store.frame.column_index(UNLABELED_TAG).is_some() && !store.frame.is_empty();

        self.models.write().insert(model_id.clone(), store);
        debug!(%model_id, "model stored");
    }

    /// Append inference rows to an existing model
    pub fn append_rows(&self, model_id: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        let mut models = self.models.write();
        let store = models
            .get_mut(model_id)
            .ok_or_else(|| SchedulerError::data_access(model_id, "unknown model"))?;

        for row in rows {
            store.frame.push_row(row);
        }
        store.metadata.observations = store.frame.len();
        store.metadata.recorded_inferences =
            store.frame.column_index(UNLABELED_TAG).is_some() && !store.frame.is_empty();
        Ok(())
    }

    pub fn remove_model(&self, model_id: &str) -> bool {
        self.models.write().remove(model_id).is_some()
    }
}

#[async_trait::async_trait]
impl DataSource for InMemoryDataSource {
    async fn get_verified_models(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.models.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn get_num_observations(&self, model_id: &str) -> Result<usize> {
        Ok(self.get_metadata(model_id).await?.observations)
    }

    async fn has_recorded_inferences(&self, model_id: &str) -> Result<bool> {
        Ok(self.get_metadata(model_id).await?.recorded_inferences)
    }

    async fn get_organic_dataframe(&self, model_id: &str, batch_size: usize) -> Result<DataFrame> {
        let models = self.models.read();
        let store = models
            .get(model_id)
            .ok_or_else(|| SchedulerError::data_access(model_id, "unknown model"))?;

        Ok(store.frame.tail(batch_size).organic())
    }

    async fn get_metadata(&self, model_id: &str) -> Result<StorageMetadata> {
        self.models
            .read()
            .get(model_id)
            .map(|store| store.metadata.clone())
            .ok_or_else(|| SchedulerError::data_access(model_id, "no metadata for model"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(n: i64) -> Vec<Vec<Value>> {
        (0..n).map(|i| vec![json!(i), json!(i == 0)]).collect()
    }

    fn source_with(model_id: &str, n: i64) -> InMemoryDataSource {
        let source = InMemoryDataSource::new();
        source.insert_model(
            StorageMetadata::new(model_id),
            DataFrame::from_rows(vec!["x".to_string(), UNLABELED_TAG.to_string()], rows(n)),
        );
        source
    }

    #[tokio::test]
    async fn test_verified_models_sorted() {
        let source = source_with("m2", 1);
        source.insert_model(StorageMetadata::new("m1"), DataFrame::default());
        assert_eq!(source.get_verified_models().await.unwrap(), vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_observations_and_inferences() {
        let source = source_with("m1", 5);
        assert_eq!(source.get_num_observations("m1").await.unwrap(), 5);
        assert!(source.has_recorded_inferences("m1").await.unwrap());

        source.insert_model(StorageMetadata::new("empty"), DataFrame::default());
        assert!(!source.has_recorded_inferences("empty").await.unwrap());

        assert!(matches!(
            source.get_metadata("missing").await,
            Err(SchedulerError::DataAccess { .. })
        ));
    }

    #[tokio::test]
    async fn test_organic_dataframe_takes_latest_rows() {
        let source = source_with("m1", 10);
        let df = source.get_organic_dataframe("m1", 4).await.unwrap();
        assert_eq!(df.column("x").unwrap(), vec![&json!(6), &json!(7), &json!(8), &json!(9)]);

        // the first row is synthetic
        let df = source.get_organic_dataframe("m1", 100).await.unwrap();
        assert_eq!(df.len(), 9);
    }

    #[tokio::test]
    async fn test_append_rows() {
        let source = source_with("m1", 2);
        source.append_rows("m1", rows(3)).unwrap();
        assert_eq!(source.get_num_observations("m1").await.unwrap(), 5);
        assert!(source.append_rows("missing", rows(1)).is_err());
        assert!(source.remove_model("m1"));
    }
}
