//! In-memory storage (tests and local development)

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{validate_path, Storage, StorageError, StorageResult, StoredObject};

/// Thread-safe via `RwLock`. Not persistent: data is lost on drop.
#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<BTreeMap<String, (DateTime<Utc>, Vec<u8>)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object with an explicit modification time
    pub fn insert_with_time(&self, path: &str, data: &[u8], modified: DateTime<Utc>) {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), (modified, data.to_vec()));
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn ls(&self, dir: &str) -> StorageResult<Vec<StoredObject>> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir.trim_end_matches('/'))
        };

        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(objects
            .iter()
            .filter_map(|(path, (modified, _))| {
                let name = path.strip_prefix(&prefix)?;
                if name.contains('/') {
                    return None;
                }
                Some(StoredObject {
                    name: name.to_string(),
                    modified: *modified,
                })
            })
            .collect())
    }

    async fn open(&self, path: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn save(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        validate_path(path)?;
        self.insert_with_time(path, data, Utc::now());
        Ok(())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_only_direct_children() {
        let storage = MemoryStorage::new();
        storage.save("keys/a.pem", b"a").await.unwrap();
        storage.save("keys/old/b.pem", b"b").await.unwrap();
        storage.save("other/c.pem", b"c").await.unwrap();

        let listed = storage.ls("keys").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "a.pem");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let storage = MemoryStorage::new();
        storage.save("x", b"1").await.unwrap();
        storage.delete("x").await.unwrap();
        storage.delete("x").await.unwrap();
        assert!(storage.is_empty());
    }
}
