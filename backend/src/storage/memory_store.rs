use std::collections::BTreeMap;

use tokio::sync::Mutex;

use super::{BlobStore, BlobStoreError};

/// In-process blob store over a sorted map, so `list` has the same
/// lexicographic ordering as S3. Test double for the S3 backend.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), BlobStoreError> {
        self.blobs.lock().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        self.blobs
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(key.to_string()))
    }

    async fn copy(&self, source_key: &str, destination_key: &str) -> Result<(), BlobStoreError> {
        let mut blobs = self.blobs.lock().await;
        let bytes = blobs
            .get(source_key)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(source_key.to_string()))?;
        blobs.insert(destination_key.to_string(), bytes);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobStoreError> {
        Ok(self
            .blobs
            .lock()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError> {
        Ok(self.blobs.lock().await.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_copy_round_trip() {
        let store = MemoryBlobStore::new();
        store
            .put("images/1.jpg", vec![1, 2, 3], "image/jpeg")
            .await
            .unwrap();
        store
            .copy("images/1.jpg", "tasks/t/images/1.jpg")
            .await
            .unwrap();
        assert_eq!(store.get("tasks/t/images/1.jpg").await.unwrap(), vec![1, 2, 3]);
        assert!(store.exists("images/1.jpg").await.unwrap());
        assert!(!store.exists("images/2.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn copy_of_a_missing_source_is_an_error() {
        let store = MemoryBlobStore::new();
        let err = store.copy("images/none.jpg", "dst").await.unwrap_err();
        assert!(matches!(err, BlobStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_is_prefix_scoped_and_sorted() {
        let store = MemoryBlobStore::new();
        store.put("tasks/t/images/2.jpg", vec![], "image/jpeg").await.unwrap();
        store.put("tasks/t/images/1.jpg", vec![], "image/jpeg").await.unwrap();
        store.put("tasks/u/images/9.jpg", vec![], "image/jpeg").await.unwrap();
        assert_eq!(
            store.list("tasks/t/images/").await.unwrap(),
            vec!["tasks/t/images/1.jpg", "tasks/t/images/2.jpg"]
        );
    }
}
