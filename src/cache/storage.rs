//! Storage trait and in-memory implementation

use std::collections::BTreeMap;
use std::future::Future;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::http::Response;

/// Errors raised by cache storage backends
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem operation failed
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored entry could not be encoded or decoded
    #[error("Cache entry is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bucket name cannot be used as a storage location
    #[error("Invalid bucket name: '{0}'")]
    InvalidBucketName(String),
}

/// Host-provided store of named cache buckets
///
/// Implementations handle their own synchronization; callers may issue
/// concurrent reads and writes. Writing to a bucket that does not exist yet
/// creates it. Reading from a missing bucket is a miss, not an error.
pub trait CacheStorage: Send + Sync {
    /// Opens a bucket, creating it if needed
    fn open(&self, bucket: &str) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Names of all existing buckets, sorted
    fn bucket_names(&self) -> impl Future<Output = Result<Vec<String>, CacheError>> + Send;

    /// Deletes a bucket and its entries; returns whether it existed
    fn delete_bucket(&self, bucket: &str) -> impl Future<Output = Result<bool, CacheError>> + Send;

    /// Looks up a stored response by key
    fn lookup(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl Future<Output = Result<Option<Response>, CacheError>> + Send;

    /// Stores a response, replacing any previous entry for the key
    fn put(
        &self,
        bucket: &str,
        key: &str,
        response: &Response,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Keys stored in a bucket, sorted; empty for a missing bucket
    fn keys(&self, bucket: &str) -> impl Future<Output = Result<Vec<String>, CacheError>> + Send;
}

/// In-process bucket store
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: Mutex<BTreeMap<String, BTreeMap<String, Response>>>,
}

impl MemoryStorage {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryStorage {
    async fn open(&self, bucket: &str) -> Result<(), CacheError> {
        self.buckets
            .lock()
            .await
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }

    async fn bucket_names(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.buckets.lock().await.keys().cloned().collect())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<bool, CacheError> {
        Ok(self.buckets.lock().await.remove(bucket).is_some())
    }

    async fn lookup(&self, bucket: &str, key: &str) -> Result<Option<Response>, CacheError> {
        let buckets = self.buckets.lock().await;
        Ok(buckets.get(bucket).and_then(|b| b.get(key)).cloned())
    }

    async fn put(&self, bucket: &str, key: &str, response: &Response) -> Result<(), CacheError> {
        self.buckets
            .lock()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), response.clone());
        Ok(())
    }

    async fn keys(&self, bucket: &str) -> Result<Vec<String>, CacheError> {
        let buckets = self.buckets.lock().await;
        Ok(buckets
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default())
    }
}
