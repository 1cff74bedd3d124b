use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use log::debug;

use super::{BlobStore, BlobStoreError};

#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket_name: String,
}

impl S3BlobStore {
    pub fn new(client: Client, bucket_name: String) -> Self {
        Self {
            client,
            bucket_name,
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BlobStoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| BlobStoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        let result = match self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
        {
            Ok(result) => result,
            Err(err) => {
                let service = err.into_service_error();
                if service.is_no_such_key() {
                    return Err(BlobStoreError::NotFound(key.to_string()));
                }
                return Err(BlobStoreError::Backend(service.to_string()));
            }
        };
        let body = result
            .body
            .collect()
            .await
            .map_err(|e| BlobStoreError::Backend(e.to_string()))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn copy(&self, source_key: &str, destination_key: &str) -> Result<(), BlobStoreError> {
        debug!("copying blob {source_key} to {destination_key}");
        self.client
            .copy_object()
            .bucket(&self.bucket_name)
            .copy_source(format!("{}/{}", self.bucket_name, source_key))
            .key(destination_key)
            .send()
            .await
            .map_err(|e| BlobStoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobStoreError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket_name)
                .prefix(prefix);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }
            let response = request
                .send()
                .await
                .map_err(|e| BlobStoreError::Backend(e.to_string()))?;
            for object in response.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }
            match response.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let service = err.into_service_error();
                if service.is_not_found() {
                    Ok(false)
                } else {
                    Err(BlobStoreError::Backend(service.to_string()))
                }
            }
        }
    }
}
