//! Access to recorded model data and storage metadata

mod frame;
mod memory;
mod metadata;

pub use frame::{DataFrame, UNLABELED_TAG};
pub use memory::InMemoryDataSource;
pub use metadata::{DataType, SchemaItem, StorageMetadata};

use crate::error::Result;

/// Source of per-model batches and metadata consumed by the scheduler
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    /// Models whose metadata could be retrieved
    async fn get_verified_models(&self) -> Result<Vec<String>>;

    /// Number of stored observations for a model
    async fn get_num_observations(&self, model_id: &str) -> Result<usize>;

    /// Whether any inference data has been recorded for a model
    async fn has_recorded_inferences(&self, model_id: &str) -> Result<bool>;

    /// The latest `batch_size` rows of a model, synthetic rows excluded
    async fn get_organic_dataframe(&self, model_id: &str, batch_size: usize) -> Result<DataFrame>;

    /// Schema and alias metadata; fails if the model is unknown
    async fn get_metadata(&self, model_id: &str) -> Result<StorageMetadata>;
}
