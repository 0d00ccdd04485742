#![allow(dead_code)]

pub mod storage;

use marquee_catalog::{CatalogService, InMemoryCatalogStore};
use marquee_storage::{KeyNormalizer, Storage};
use std::sync::Arc;

pub const ROOT: &str = "movies";

pub fn normalizer() -> KeyNormalizer {
    KeyNormalizer::new(ROOT)
}

/// Service over `storage` with an empty in-memory catalog and no extension
/// filter.
pub fn service_over(storage: Arc<dyn Storage>) -> (CatalogService, Arc<InMemoryCatalogStore>) {
    let store = Arc::new(InMemoryCatalogStore::new());
    let service = CatalogService::new(storage, normalizer(), store.clone());
    (service, store)
}
