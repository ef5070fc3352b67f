//! Local filesystem artifact backend, used for development and tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use gridagent_core::StorageBackend;

use crate::keys::{input_key, output_key};
use crate::traits::{ArtifactStore, StorageError, StorageResult};

#[derive(Clone)]
pub struct LocalArtifactStore {
    base_path: PathBuf,
}

impl LocalArtifactStore {
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;
        Ok(LocalArtifactStore { base_path })
    }

    async fn write(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.base_path.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        tracing::debug!(path = %path.display(), size_bytes = data.len(), "artifact written");
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put_output_from_bytes(&self, task_id: &str, data: &[u8]) -> StorageResult<()> {
        self.write(&output_key(task_id), data).await
    }

    async fn put_output_from_file(&self, task_id: &str, file: &Path) -> StorageResult<()> {
        let data = fs::read(file).await?;
        self.write(&output_key(task_id), &data).await
    }

    async fn get_input(&self, task_id: &str) -> StorageResult<Vec<u8>> {
        let path = self.base_path.join(input_key(task_id));
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
