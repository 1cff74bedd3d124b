use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde_json::{Value, json};
use shared::{FilterPredicate, TaskStage};

use super::WorkerError;
use super::consumer::TaskHandler;
use crate::db::ProductCatalog;
use crate::imgproc::augment::augment;
use crate::queue::Delivery;
use crate::storage::{BlobStore, TaskNamespace};

/// Filter-stage consumer: queries the catalog, copies every matched image
/// into the task namespace, writes the metadata manifest, then runs the
/// optional augmentation pass.
pub struct ImageryWorker {
    catalog: Arc<dyn ProductCatalog>,
    blobs: Arc<dyn BlobStore>,
    source_prefix: String,
    augmentation_seed: u64,
}

impl ImageryWorker {
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        blobs: Arc<dyn BlobStore>,
        source_prefix: String,
        augmentation_seed: u64,
    ) -> Self {
        Self {
            catalog,
            blobs,
            source_prefix,
            augmentation_seed,
        }
    }

    async fn run_filter(
        &self,
        task_id: &str,
        predicate: &FilterPredicate,
    ) -> Result<Value, WorkerError> {
        let records = self.catalog.filter_products(predicate).await?;
        info!("task {task_id}: {} catalog rows matched", records.len());

        let namespace = TaskNamespace::new(task_id);
        for record in &records {
            let source = format!("{}/{}.jpg", self.source_prefix, record.image_id);
            self.blobs
                .copy(&source, &namespace.image_key(&record.image_id))
                .await?;
        }

        // The manifest is the durable completion signal for this stage, so it
        // is written only after every copy has landed.
        let metadata = serde_json::to_vec(&records)?;
        self.blobs
            .put(&namespace.metadata_key(), metadata, "application/json")
            .await?;

        if let Some(config) = &predicate.augmentation_config {
            let params = config.resolve()?;
            info!(
                "task {task_id}: augmenting {} images ({params:?})",
                records.len()
            );
            for record in &records {
                let original = self.blobs.get(&namespace.image_key(&record.image_id)).await?;
                let augmented = augment(&original, &params, self.augmentation_seed)?;
                self.blobs
                    .put(
                        &namespace.augmentation_key(&record.image_id),
                        augmented,
                        "image/jpeg",
                    )
                    .await?;
            }
        }

        Ok(json!({
            "s3_target": namespace.root(),
            "matched": records.len(),
        }))
    }
}

#[async_trait]
impl TaskHandler for ImageryWorker {
    fn stage(&self) -> TaskStage {
        TaskStage::Filter
    }

    async fn handle(&self, delivery: &Delivery) -> Result<Value, WorkerError> {
        let predicate: FilterPredicate = serde_json::from_value(delivery.payload.clone())?;
        self.run_filter(&delivery.task_id, &predicate).await
    }
}
