//! Blob store abstraction and backends.
//!
//! Every durable artifact the server owns — uploaded documents, index
//! artifacts, status records, usage counters — lives in a bucket/key
//! store behind the [`BlobStore`] trait. The production backend talks to
//! S3 (or an S3-compatible endpoint) over its REST API; an in-memory
//! backend backs the test suites.

mod memory;
mod s3;

pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned while interacting with the blob store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Endpoint URL failed to parse or normalize.
    #[error("Invalid blob store endpoint: {0}")]
    InvalidEndpoint(String),
    /// Credentials were missing or unusable.
    #[error("Blob store credentials unavailable: {0}")]
    Credentials(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The store responded with an unexpected status code.
    #[error("Unexpected blob store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the store.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The requested object does not exist.
    #[error("Object not found: {bucket}/{key}")]
    NotFound {
        /// Bucket that was queried.
        bucket: String,
        /// Key that was missing.
        key: String,
    },
}

impl StorageError {
    /// Whether this error means the object simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Interface to a durable bucket/key object store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write an object, replacing any previous content under the key.
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// Fetch an object's bytes, failing with [`StorageError::NotFound`] when absent.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Enumerate all keys beginning with the given prefix.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Delete an object. Deleting an absent key is a success.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}
