//! Marquee Core Library
//!
//! This crate provides the domain models, configuration and error metadata
//! shared by every Marquee component.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::Config;
pub use error::{ErrorMetadata, LogLevel};
pub use models::{CatalogEntry, LiveObject};
pub use storage_types::StorageBackend;
