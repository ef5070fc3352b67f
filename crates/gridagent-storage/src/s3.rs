//! S3 artifact backend.

use std::path::Path;

use async_trait::async_trait;
use aws_config::retry::{RetryConfig, RetryMode};
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;

use gridagent_core::StorageBackend;

use crate::keys::{input_key, output_key};
use crate::traits::{ArtifactStore, StorageError, StorageResult};

#[derive(Clone)]
pub struct S3ArtifactStore {
    client: Client,
    bucket: String,
}

impl S3ArtifactStore {
    pub async fn new(bucket: String, region: String) -> StorageResult<Self> {
        let retry_config = RetryConfig::standard()
            .with_max_attempts(5)
            .with_retry_mode(RetryMode::Adaptive);

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region))
            .retry_config(retry_config)
            .load()
            .await;

        Ok(S3ArtifactStore {
            client: Client::new(&config),
            bucket,
        })
    }

    async fn put(&self, key: &str, body: ByteStream, size_hint: Option<u64>) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await;

        match result {
            Ok(_) => {
                tracing::info!(
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size_hint,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "artifact upload successful"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    "artifact upload failed"
                );
                Err(StorageError::UploadFailed(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put_output_from_bytes(&self, task_id: &str, data: &[u8]) -> StorageResult<()> {
        let size = data.len() as u64;
        let body = ByteStream::from(Bytes::copy_from_slice(data));
        self.put(&output_key(task_id), body, Some(size)).await
    }

    async fn put_output_from_file(&self, task_id: &str, file: &Path) -> StorageResult<()> {
        let body = ByteStream::from_path(file)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        self.put(&output_key(task_id), body, None).await
    }

    async fn get_input(&self, task_id: &str) -> StorageResult<Vec<u8>> {
        let key = input_key(task_id);
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, bucket = %self.bucket, key = %key, "artifact download failed");
                StorageError::DownloadFailed(e.to_string())
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;
        Ok(data.into_bytes().to_vec())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
