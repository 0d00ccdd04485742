//! Marquee Storage Library
//!
//! Storage abstraction and key normalization for the movie catalog. It
//! includes the Storage trait and implementations for S3-compatible object
//! stores and the local filesystem.
//!
//! # Storage key format
//!
//! Both layouts coexist under one root prefix (default `movies`):
//!
//! - **Shared (legacy flat)**: `movies/{filename}`
//! - **Per-owner**: `movies/{owner}/{filename}`
//!
//! Keys never contain `..`, empty segments or a leading `/`. Every key that
//! reaches a backend goes through [`keys::KeyNormalizer`] first.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::{create_normalizer, create_storage};
pub use keys::{basename, extension, reference_basename, KeyNormalizer};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use marquee_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
