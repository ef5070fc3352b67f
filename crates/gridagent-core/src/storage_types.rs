//! Artifact-store backend selector.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Local,
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::S3 => write!(f, "S3"),
            StorageBackend::Local => write!(f, "LOCAL"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "S3" => Ok(StorageBackend::S3),
            "LOCAL" => Ok(StorageBackend::Local),
            _ => Err(anyhow::anyhow!("Unsupported storage backend: {}", s)),
        }
    }
}
