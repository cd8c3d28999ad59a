//! Artifact storage for crawl runs.
//!
//! Runs write raw HTML snapshots (gzipped) and extracted-content JSON under
//! deterministic, run-scoped keys; later phases and future runs read them
//! back. The store itself is an injected backend; the in-memory
//! implementation here is what tests use.

mod gzip;
mod keys;
mod memory;

pub use gzip::{gzip_bytes, gunzip_bytes};
pub use keys::{extracted_content_key, raw_html_key};
pub use memory::MemoryArtifactStore;

use thiserror::Error;

/// MIME type recorded for gzipped HTML snapshots.
pub const CONTENT_TYPE_HTML_GZIP: &str = "application/gzip";

/// MIME type recorded for extracted-content JSON.
pub const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("gzip codec failure: {0}")]
    Codec(String),
}

/// Blob storage contract.
///
/// `put` is idempotent by key: keys are content-addressed within a run, so a
/// second write of the same key carries equal bytes.
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str)
    -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// A URL granting time-limited read access to one key. The TTL is
    /// enforced by the backend.
    async fn signed_url(&self, key: &str, ttl_secs: u64) -> Result<String, StorageError>;
}
