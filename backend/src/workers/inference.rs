use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde_json::{Value, json};
use shared::{InferenceMessage, PredictionRecord, TaskStage};

use super::WorkerError;
use super::consumer::TaskHandler;
use crate::imgproc::model::FashionModel;
use crate::queue::Delivery;
use crate::storage::{BlobStore, TaskNamespace};

/// Inference-stage consumer: scores every image a filter task produced
/// (originals and augmented variants) with one shared model instance and
/// writes the predictions manifest in a single final put.
pub struct InferenceWorker {
    blobs: Arc<dyn BlobStore>,
    model: Arc<FashionModel>,
}

impl InferenceWorker {
    pub fn new(blobs: Arc<dyn BlobStore>, model: Arc<FashionModel>) -> Self {
        Self { blobs, model }
    }

    async fn run_inference(&self, source_task_id: &str) -> Result<Value, WorkerError> {
        let namespace = TaskNamespace::new(source_task_id);
        if !self.blobs.exists(&namespace.metadata_key()).await? {
            return Err(WorkerError::SourceNotReady(source_task_id.to_string()));
        }

        let mut keys = self.blobs.list(&namespace.images_prefix()).await?;
        keys.sort();
        let mut augmented = self.blobs.list(&namespace.augmentation_prefix()).await?;
        augmented.sort();
        keys.extend(augmented);
        info!(
            "task {source_task_id}: scoring {} images from {}",
            keys.len(),
            namespace.root()
        );

        let mut predictions: Vec<PredictionRecord> = Vec::with_capacity(keys.len());
        for key in &keys {
            let bytes = self.blobs.get(key).await?;
            predictions.push(self.model.predict(key, &bytes)?);
        }

        let body = serde_json::to_vec(&predictions)?;
        self.blobs
            .put(&namespace.inferences_key(), body, "application/json")
            .await?;

        Ok(json!({
            "s3_target": namespace.root(),
            "predictions": predictions.len(),
        }))
    }
}

#[async_trait]
impl TaskHandler for InferenceWorker {
    fn stage(&self) -> TaskStage {
        TaskStage::Inference
    }

    async fn handle(&self, delivery: &Delivery) -> Result<Value, WorkerError> {
        let message: InferenceMessage = serde_json::from_value(delivery.payload.clone())?;
        self.run_inference(&message.task_id).await
    }
}
