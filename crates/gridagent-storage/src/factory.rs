//! Create an artifact backend based on configuration.

use std::sync::Arc;

use gridagent_core::{AgentConfig, StorageBackend};

use crate::local::LocalArtifactStore;
use crate::s3::S3ArtifactStore;
use crate::traits::{ArtifactStore, StorageError, StorageResult};

/// Working-directory subtree backing the local backend.
const LOCAL_ARTIFACT_DIR: &str = "./grid-artifacts";

/// Build the artifact store named by `grid_storage_service`.
pub async fn create_artifact_store(config: &AgentConfig) -> StorageResult<Arc<dyn ArtifactStore>> {
    let backend: StorageBackend = config
        .grid_storage_service
        .parse()
        .map_err(|e| StorageError::ConfigError(format!("{}", e)))?;

    match backend {
        StorageBackend::S3 => {
            if config.s3_bucket.is_empty() {
                return Err(StorageError::ConfigError(
                    "s3_bucket not configured".to_string(),
                ));
            }
            let store =
                S3ArtifactStore::new(config.s3_bucket.clone(), config.region.clone()).await?;
            Ok(Arc::new(store))
        }
        StorageBackend::Local => {
            let store = LocalArtifactStore::new(LOCAL_ARTIFACT_DIR).await?;
            Ok(Arc::new(store))
        }
    }
}
