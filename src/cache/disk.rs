//! Disk-backed bucket store
//!
//! Each bucket is a directory under the cache root (`~/.cache/folio-offline/`
//! on Linux) and each entry a JSON file named after the SHA-256 of the
//! request URL. Entries record when they were stored.

use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use super::storage::{CacheError, CacheStorage};
use crate::http::Response;

/// Extension of entry files inside a bucket directory
const ENTRY_EXTENSION: &str = "json";

/// A response as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Request URL the response was stored under
    pub key: String,
    /// The stored response
    pub response: Response,
    /// When the entry was written
    pub cached_at: DateTime<Utc>,
}

/// Persists cache buckets as directories of JSON files
#[derive(Debug, Clone)]
pub struct DiskStorage {
    /// Directory holding one subdirectory per bucket
    root: PathBuf,
}

impl DiskStorage {
    /// Creates a store in the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "folio-offline")?;
        Some(Self::with_dir(project_dirs.cache_dir().join("buckets")))
    }

    /// Creates a store rooted at a custom directory
    pub fn with_dir(root: PathBuf) -> Self {
        Self { root }
    }

    /// Root directory of the store
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Directory of a bucket, rejecting names that would escape the root
    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, CacheError> {
        let invalid = bucket.is_empty()
            || bucket == "."
            || bucket == ".."
            || bucket.contains(['/', '\\', '\0']);
        if invalid {
            return Err(CacheError::InvalidBucketName(bucket.to_string()));
        }
        Ok(self.root.join(bucket))
    }

    /// Path of the entry file for a key
    fn entry_path(&self, bucket: &str, key: &str) -> Result<PathBuf, CacheError> {
        Ok(self
            .bucket_dir(bucket)?
            .join(format!("{}.{}", encode_key(key), ENTRY_EXTENSION)))
    }

    /// Reads a stored entry including its timestamp
    ///
    /// Returns `Ok(None)` when the entry does not exist.
    pub async fn read_entry(&self, bucket: &str, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let path = self.entry_path(bucket, key)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: StoredEntry = serde_json::from_str(&content)?;
        Ok(Some(entry))
    }

    /// Writes an entry, creating the bucket directory if missing
    pub async fn write_entry(&self, bucket: &str, key: &str, response: &Response) -> Result<(), CacheError> {
        let dir = self.bucket_dir(bucket)?;
        fs::create_dir_all(&dir).await?;

        let entry = StoredEntry {
            key: key.to_string(),
            response: response.clone(),
            cached_at: Utc::now(),
        };
        let json = serde_json::to_string(&entry)?;

        // Write then rename so a concurrent reader never sees a partial file
        let path = self.entry_path(bucket, key)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// All entries of a bucket, sorted by key; unreadable files are skipped
    pub async fn entries(&self, bucket: &str) -> Result<Vec<StoredEntry>, CacheError> {
        let dir = self.bucket_dir(bucket)?;
        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(dir_entry) = read_dir.next_entry().await? {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let parsed = match fs::read_to_string(&path).await {
                Ok(content) => serde_json::from_str::<StoredEntry>(&content).map_err(CacheError::from),
                Err(e) => Err(CacheError::from(e)),
            };
            match parsed {
                Ok(entry) => entries.push(entry),
                Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable cache entry"),
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

impl CacheStorage for DiskStorage {
    async fn open(&self, bucket: &str) -> Result<(), CacheError> {
        fs::create_dir_all(self.bucket_dir(bucket)?).await?;
        Ok(())
    }

    async fn bucket_names(&self) -> Result<Vec<String>, CacheError> {
        let mut read_dir = match fs::read_dir(&self.root).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(dir_entry) = read_dir.next_entry().await? {
            if dir_entry.file_type().await?.is_dir() {
                if let Some(name) = dir_entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<bool, CacheError> {
        match fs::remove_dir_all(self.bucket_dir(bucket)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn lookup(&self, bucket: &str, key: &str) -> Result<Option<Response>, CacheError> {
        Ok(self.read_entry(bucket, key).await?.map(|entry| entry.response))
    }

    async fn put(&self, bucket: &str, key: &str, response: &Response) -> Result<(), CacheError> {
        self.write_entry(bucket, key, response).await
    }

    async fn keys(&self, bucket: &str) -> Result<Vec<String>, CacheError> {
        Ok(self.entries(bucket).await?.into_iter().map(|entry| entry.key).collect())
    }
}

/// Hashes a key into a fixed-length, filesystem-safe file stem
fn encode_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
