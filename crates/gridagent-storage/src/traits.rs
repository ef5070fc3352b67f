//! Artifact-store abstraction trait.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use gridagent_core::StorageBackend;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Artifact store consumed by the agent.
///
/// Outputs are keyed by task id; the committer writes exactly one stdout
/// artifact per completed task. Inputs are only read when task payloads are
/// externalized by the submission pipeline.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist an in-memory stdout payload under the task's output key.
    async fn put_output_from_bytes(&self, task_id: &str, data: &[u8]) -> StorageResult<()>;

    /// Persist a local stdout file under the task's output key.
    async fn put_output_from_file(&self, task_id: &str, file: &Path) -> StorageResult<()>;

    /// Fetch the task's externalized input payload.
    async fn get_input(&self, task_id: &str) -> StorageResult<Vec<u8>>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
