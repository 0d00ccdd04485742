//! Marquee Catalog Library
//!
//! Reconciles the persisted movie catalog against live storage and deletes
//! files by whatever identifier a client sends.

pub mod deletion;
pub mod error;
pub mod reconcile;
pub mod request;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use deletion::{DeleteOutcome, DeletionCoordinator};
pub use error::{CatalogError, CatalogResult};
pub use reconcile::{entry_basename, reconcile, ReconciliationResult};
pub use request::{DeleteRequest, RequestFields};
pub use service::{CatalogService, CatalogView, StoredFile};
pub use store::{CatalogStore, InMemoryCatalogStore, JsonFileCatalogStore, SHARED_SCOPE};
