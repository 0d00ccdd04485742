use crate::keys::{is_folder_placeholder, FOLDER_MARKER};
use crate::traits::{encode_key_for_url, listing_dir, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    RetryConfig,
};
use std::sync::Arc;

/// S3-compatible storage implementation
///
/// Holds any [`ObjectStore`]; production wires an `AmazonS3` client, tests an
/// in-memory store.
#[derive(Clone)]
pub struct S3Storage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    /// * `max_retries` - Bounded retries for transient backend failures
    pub fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        max_retries: usize,
    ) -> StorageResult<Self> {
        let retry = RetryConfig {
            max_retries,
            ..Default::default()
        };

        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone())
            .with_retry(retry);

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self::with_store(Arc::new(store), bucket, region, endpoint_url))
    }

    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> Self {
        S3Storage {
            store,
            bucket,
            region,
            endpoint_url,
        }
    }

    /// Generate public URL for S3 object
    ///
    /// For AWS S3, uses the standard format: https://{bucket}.s3.{region}.amazonaws.com/{key}
    /// For S3-compatible providers, path-style: {endpoint}/{bucket}/{key}
    fn generate_url(&self, key: &str) -> String {
        format!("{}/{}", self.url_base(), encode_key_for_url(key))
    }

    fn url_base(&self) -> String {
        match self.endpoint_url {
            Some(ref endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }

    fn map_error(&self, key: &str, e: ObjectStoreError) -> StorageError {
        match e {
            ObjectStoreError::InvalidPath { source } => {
                StorageError::InvalidKey(format!("{}: {}", key, source))
            }
            other => {
                tracing::warn!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %key,
                    "S3 backend call failed"
                );
                StorageError::Unavailable(other.to_string())
            }
        }
    }
}

/// `Path` percent-encodes characters it does not allow; listings hand them
/// back encoded.
fn key_from_location(location: &Path) -> String {
    let raw = location.as_ref();
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

#[async_trait]
impl Storage for S3Storage {
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let start = std::time::Instant::now();
        let dir = listing_dir(prefix);
        let dir_path = Path::from(dir);
        let location = (!dir.is_empty()).then_some(&dir_path);

        // The stream follows continuation tokens until the listing is exhausted.
        let mut stream = self.store.list(location);
        let mut keys = Vec::new();
        let mut seen = 0usize;
        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| self.map_error(prefix, e))?
        {
            seen += 1;
            let key = key_from_location(&meta.location);
            if key.starts_with(prefix) && !is_folder_placeholder(&key, meta.size as u64) {
                keys.push(key);
            }
        }

        keys.sort();

        tracing::debug!(
            bucket = %self.bucket,
            prefix = %prefix,
            objects_seen = seen,
            count = keys.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 list successful"
        );

        Ok(keys)
    }

    async fn create_folder(&self, prefix: &str) -> StorageResult<()> {
        let marker = format!("{}/{}", prefix.trim_end_matches('/'), FOLDER_MARKER);
        let location = Path::from(marker.as_str());

        self.store
            .put(&location, PutPayload::default())
            .await
            .map_err(|e| self.map_error(&marker, e))?;

        tracing::debug!(bucket = %self.bucket, key = %marker, "S3 folder marker written");
        Ok(())
    }

    async fn write(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String> {
        let size = data.len() as u64;
        let location = Path::from(key);
        let start = std::time::Instant::now();

        let mut attributes = Attributes::new();
        if !content_type.is_empty() {
            attributes.insert(
                Attribute::ContentType,
                AttributeValue::from(content_type.to_string()),
            );
        }
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&location, PutPayload::from(data), options)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 write failed"
                );
                self.map_error(key, e)
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 write successful"
        );

        Ok(key.to_string())
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<bool> {
        let start = std::time::Instant::now();
        let location = Path::from(storage_key);

        match self.store.delete(&location).await {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => return Err(self.map_error(storage_key, e)),
        }

        // S3 acknowledges deletes of missing keys, so only a probe tells us
        // the object is gone.
        let gone = !self.exists(storage_key).await?;

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            verified_absent = gone,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete finished"
        );

        Ok(gone)
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let location = Path::from(storage_key);
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(self.map_error(storage_key, e)),
        }
    }

    fn public_url(&self, key: &str) -> String {
        self.generate_url(key)
    }

    fn public_url_base(&self) -> String {
        self.url_base()
    }
}
