pub mod consumer;
pub mod imagery;
pub mod inference;

use shared::TaskStage;

use crate::db::CatalogError;
use crate::imgproc::augment::AugmentError;
use crate::imgproc::model::ModelError;
use crate::storage::BlobStoreError;

/// Failure of one delivery attempt. Workers never swallow adapter errors;
/// everything here propagates to the queue's retry bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("storage error: {0}")]
    Storage(#[from] BlobStoreError),
    #[error("augmentation config error: {0}")]
    Config(#[from] shared::ConfigError),
    #[error("augmentation error: {0}")]
    Augment(#[from] AugmentError),
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("unexpected {0} task on this queue")]
    WrongStage(TaskStage),
    #[error("source task {0} has no metadata manifest yet")]
    SourceNotReady(String),
}
