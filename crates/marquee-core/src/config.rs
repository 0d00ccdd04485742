//! Configuration module
//!
//! Everything is read once at startup from the environment (and an optional
//! `.env` file). Nothing in request handling re-reads configuration.

use std::env;

use crate::storage_types::StorageBackend;

const DEFAULT_ROOT_PREFIX: &str = "movies";
const DEFAULT_LEGACY_PREFIXES: &str = "uploads";
const DEFAULT_LOCAL_STORAGE_PATH: &str = "/data";
const DEFAULT_LOCAL_STORAGE_BASE_URL: &str = "/public";
const DEFAULT_CATALOG_PATH: &str = "catalog.json";
const DEFAULT_ALLOWED_EXTENSIONS: &str = "mp4,mov,avi,webm,mkv";
const S3_MAX_RETRIES: usize = 3;
const ORPHAN_GRACE_PASSES: u32 = 3;

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    environment: String,
    log_format: String,
    // Storage configuration
    storage_backend: StorageBackend,
    root_prefix: String,
    legacy_prefixes: Vec<String>,
    s3_bucket: Option<String>,
    s3_region: Option<String>,
    s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, Spaces, ...)
    s3_max_retries: usize,
    local_storage_path: String,
    local_storage_base_url: String,
    // Catalog configuration
    catalog_path: String,
    allowed_extensions: Vec<String>,
    orphan_grace_passes: u32,
    strict_delete: bool,
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(raw: Option<String>, default: bool) -> bool {
    raw.map(|s| s.trim().to_lowercase())
        .and_then(|s| match s.as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let storage_backend = match var("STORAGE_BACKEND").or_else(|| var("STORAGE_TYPE")) {
            Some(raw) => raw.parse::<StorageBackend>()?,
            None => StorageBackend::Local,
        };

        let root_prefix = var("MOVIES_FOLDER")
            .unwrap_or_else(|| DEFAULT_ROOT_PREFIX.to_string())
            .split('/')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");

        let config = Config {
            environment: var("ENVIRONMENT")
                .or_else(|| var("APP_ENV"))
                .unwrap_or_else(|| "development".to_string()),
            log_format: var("LOG_FORMAT")
                .unwrap_or_else(|| "text".to_string())
                .to_lowercase(),
            storage_backend,
            root_prefix,
            legacy_prefixes: parse_list(
                &var("LEGACY_UPLOAD_PREFIXES").unwrap_or_else(|| DEFAULT_LEGACY_PREFIXES.into()),
            ),
            s3_bucket: var("S3_BUCKET").or_else(|| var("AWS_BUCKET")),
            s3_region: var("S3_REGION").or_else(|| var("AWS_REGION")),
            s3_endpoint: var("S3_ENDPOINT"),
            s3_max_retries: var("S3_MAX_RETRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(S3_MAX_RETRIES),
            local_storage_path: var("LOCAL_STORAGE_PATH")
                .or_else(|| var("DISK_ROOT_PATH"))
                .unwrap_or_else(|| DEFAULT_LOCAL_STORAGE_PATH.to_string()),
            local_storage_base_url: var("LOCAL_STORAGE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LOCAL_STORAGE_BASE_URL.to_string()),
            catalog_path: var("CATALOG_PATH").unwrap_or_else(|| DEFAULT_CATALOG_PATH.to_string()),
            allowed_extensions: parse_list(
                &lookup("CATALOG_ALLOWED_EXTENSIONS")
                    .unwrap_or_else(|| DEFAULT_ALLOWED_EXTENSIONS.to_string()),
            ),
            orphan_grace_passes: var("ORPHAN_GRACE_PASSES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(ORPHAN_GRACE_PASSES),
            strict_delete: parse_bool(var("STRICT_DELETE"), false),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.root_prefix.is_empty() {
            return Err(anyhow::anyhow!("MOVIES_FOLDER must not be empty"));
        }

        if self
            .legacy_prefixes
            .iter()
            .any(|p| p.trim_matches('/') == self.root_prefix)
        {
            return Err(anyhow::anyhow!(
                "LEGACY_UPLOAD_PREFIXES must not contain the root prefix '{}'",
                self.root_prefix
            ));
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET (or AWS_BUCKET) must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {}
        }

        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        matches!(
            self.environment.to_lowercase().as_str(),
            "production" | "prod"
        )
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn log_json(&self) -> bool {
        self.log_format == "json"
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.storage_backend
    }

    /// Root key prefix, without leading or trailing slashes.
    pub fn root_prefix(&self) -> &str {
        &self.root_prefix
    }

    pub fn legacy_prefixes(&self) -> &[String] {
        &self.legacy_prefixes
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.s3_endpoint.as_deref()
    }

    pub fn s3_max_retries(&self) -> usize {
        self.s3_max_retries
    }

    pub fn local_storage_path(&self) -> &str {
        &self.local_storage_path
    }

    pub fn local_storage_base_url(&self) -> &str {
        &self.local_storage_base_url
    }

    pub fn catalog_path(&self) -> &str {
        &self.catalog_path
    }

    /// Lowercase extensions (no dot) shown in the catalog view. Empty allows all.
    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    pub fn orphan_grace_passes(&self) -> u32 {
        self.orphan_grace_passes
    }

    pub fn strict_delete(&self) -> bool {
        self.strict_delete
    }
}
