//! Byte storage collaborator used by the keychain and the upload handlers

pub mod local;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use local::LocalStorage;
pub use memory::MemoryStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Entry returned by [`Storage::ls`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub name: String,
    pub modified: DateTime<Utc>,
}

/// Flat object storage addressed by `/`-separated relative paths
#[async_trait]
pub trait Storage: Send + Sync {
    /// List the objects directly under `dir`. A missing directory lists as empty.
    async fn ls(&self, dir: &str) -> StorageResult<Vec<StoredObject>>;

    /// Read the full contents of `path`
    async fn open(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Create or replace `path`
    async fn save(&self, path: &str, data: &[u8]) -> StorageResult<()>;

    /// Remove `path`. Succeeds if it was already gone.
    async fn delete(&self, path: &str) -> StorageResult<()>;
}

/// Join a directory and a file name into a storage path
pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Reject absolute paths and parent-directory components
pub(crate) fn validate_path(path: &str) -> StorageResult<()> {
    if path.is_empty()
        || path.starts_with('/')
        || path.split('/').any(|part| part == ".." || part == ".")
    {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paths() {
        assert_eq!(join("documents", "a.txt"), "documents/a.txt");
        assert_eq!(join("documents/", "a.txt"), "documents/a.txt");
        assert_eq!(join("", "a.txt"), "a.txt");
    }

    #[test]
    fn rejects_escaping_paths() {
        assert!(validate_path("keys/1.pem").is_ok());
        assert!(validate_path("../etc/passwd").is_err());
        assert!(validate_path("/etc/passwd").is_err());
        assert!(validate_path("keys/./1.pem").is_err());
        assert!(validate_path("").is_err());
    }
}
