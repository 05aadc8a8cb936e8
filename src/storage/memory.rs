//! In-memory [`BlobStore`] implementation backing the test suites.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{BlobStore, StorageError};

/// In-process blob store keyed by `(bucket, key)` pairs.
///
/// Keys are held in a sorted map so `list` output is deterministic.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently held across all buckets.
    pub fn object_count(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.objects
            .write()
            .expect("lock poisoned")
            .insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .expect("lock poisoned")
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let objects = self.objects.read().expect("lock poisoned");
        Ok(objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.objects
            .write()
            .expect("lock poisoned")
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}
