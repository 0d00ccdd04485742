//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or answered with a server-side failure.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::IoError(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage abstraction trait
///
/// All storage backends (S3-compatible object store, local filesystem) implement
/// this trait. Keys are canonical keys as produced by [`crate::keys`]:
/// `{root}/{file}` or `{root}/{owner}/{file}`.
///
/// Implementations hold only configuration and a backend client, so one
/// instance is shared read-only across concurrent requests.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// All object keys starting with `prefix`, sorted. Folder placeholders are
    /// excluded and paginated backends are read to the end.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Best-effort folder creation. Backends without folders write a zero-byte
    /// placeholder object.
    async fn create_folder(&self, prefix: &str) -> StorageResult<()>;

    /// Store bytes at `key`, overwriting any existing object. Returns the key.
    async fn write(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String>;

    /// Delete `key`, then probe for it. `Ok(true)` means the object is verified
    /// absent, including when it never existed. `Ok(false)` means the probe
    /// still saw it.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Metadata probe: does an object exist at `key`?
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Public URL for `key`, built from configuration without a network call.
    fn public_url(&self, key: &str) -> String;

    /// What `public_url` puts in front of the encoded key, without the
    /// separating `/`.
    fn public_url_base(&self) -> String;
}

/// Percent-encode each segment of a key for use in a URL path.
pub(crate) fn encode_key_for_url(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Split a string prefix into the directory part (up to and including the last
/// `/`) that a backend can walk.
pub(crate) fn listing_dir(prefix: &str) -> &str {
    match prefix.rfind('/') {
        Some(idx) => &prefix[..=idx],
        None => "",
    }
}
