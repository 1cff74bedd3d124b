pub mod memory_store;
pub mod s3_store;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("storage error: {0}")]
    Backend(String),
    #[error("blob not found: {0}")]
    NotFound(String),
}

/// Content-addressed blob namespace shared by the API and both workers.
/// Writes are idempotent overwrites, so at-least-once task redelivery never
/// needs a lock around the namespace.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BlobStoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError>;

    async fn copy(&self, source_key: &str, destination_key: &str) -> Result<(), BlobStoreError>;

    /// Keys under `prefix`, lexicographically ordered.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobStoreError>;

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError>;
}

/// Key layout for one task's artifacts under `tasks/{task_id}/`.
#[derive(Debug, Clone)]
pub struct TaskNamespace {
    root: String,
}

impl TaskNamespace {
    pub fn new(task_id: &str) -> Self {
        Self {
            root: format!("tasks/{task_id}"),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn metadata_key(&self) -> String {
        format!("{}/metadata.json", self.root)
    }

    pub fn image_key(&self, image_id: &str) -> String {
        format!("{}/images/{image_id}.jpg", self.root)
    }

    pub fn images_prefix(&self) -> String {
        format!("{}/images/", self.root)
    }

    pub fn augmentation_key(&self, image_id: &str) -> String {
        format!("{}/augmentation/{image_id}.jpg", self.root)
    }

    pub fn augmentation_prefix(&self) -> String {
        format!("{}/augmentation/", self.root)
    }

    pub fn inferences_key(&self) -> String {
        format!("{}/inferences.json", self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_keys_follow_the_task_layout() {
        let ns = TaskNamespace::new("abc-123");
        assert_eq!(ns.root(), "tasks/abc-123");
        assert_eq!(ns.metadata_key(), "tasks/abc-123/metadata.json");
        assert_eq!(ns.image_key("42"), "tasks/abc-123/images/42.jpg");
        assert_eq!(ns.augmentation_key("42"), "tasks/abc-123/augmentation/42.jpg");
        assert_eq!(ns.inferences_key(), "tasks/abc-123/inferences.json");
    }
}
