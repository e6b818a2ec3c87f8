//! Cache bucket storage
//!
//! A bucket is a named key/value store mapping request URLs to buffered
//! responses. The worker only talks to buckets through the `CacheStorage`
//! trait; `MemoryStorage` keeps everything in process and `DiskStorage`
//! persists each bucket as a directory of JSON entries.

mod disk;
mod storage;

pub use disk::{DiskStorage, StoredEntry};
pub use storage::{CacheError, CacheStorage, MemoryStorage};
