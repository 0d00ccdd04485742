use std::sync::Arc;

use anyhow::Context;
use marquee_catalog::{CatalogService, JsonFileCatalogStore};
use marquee_core::Config;
use marquee_storage::Storage;

const DEFAULT_LOG_FILTER: &str = "warn,marquee=info";

/// Initialize tracing for CLI binaries.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Storage backend and catalog service wired from configuration.
pub async fn build_service(config: &Config) -> anyhow::Result<(Arc<dyn Storage>, CatalogService)> {
    let storage = marquee_storage::create_storage(config)
        .await
        .context("Failed to initialize storage backend")?;
    let store = Arc::new(JsonFileCatalogStore::new(config.catalog_path()));
    let service = CatalogService::from_config(config, storage.clone(), store);
    Ok((storage, service))
}

/// Content type for an upload, from its extension.
pub fn guess_content_type(file_name: &str) -> &'static str {
    match marquee_storage::extension(file_name).as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}
