//! Catalog errors and their HTTP presentation.

use marquee_core::{ErrorMetadata, LogLevel};
use marquee_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("No file identifier supplied")]
    MissingIdentifier,

    /// Only produced in strict mode; otherwise a missing file is an
    /// idempotent success.
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Could not delete '{identifier}': {reason}")]
    Unresolvable { identifier: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Catalog store error: {0}")]
    Store(String),

    #[error("Catalog document error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// (status, code, recoverable, log level)
fn static_metadata(error: &CatalogError) -> (u16, &'static str, bool, LogLevel) {
    match error {
        CatalogError::MissingIdentifier => (400, "MISSING_IDENTIFIER", false, LogLevel::Debug),
        CatalogError::NotFound(_) => (404, "NOT_FOUND", false, LogLevel::Debug),
        CatalogError::Unresolvable { .. } => {
            (500, "UNRESOLVABLE_IDENTIFIER", true, LogLevel::Error)
        }
        CatalogError::Storage(StorageError::InvalidKey(_)) => {
            (400, "INVALID_KEY", false, LogLevel::Debug)
        }
        CatalogError::Storage(e) if e.is_unavailable() => {
            (500, "STORAGE_UNAVAILABLE", true, LogLevel::Warn)
        }
        CatalogError::Storage(_) => (500, "STORAGE_ERROR", true, LogLevel::Error),
        CatalogError::Store(_) | CatalogError::Serialization(_) | CatalogError::Io(_) => {
            (500, "CATALOG_STORE_ERROR", true, LogLevel::Error)
        }
    }
}

impl ErrorMetadata for CatalogError {
    fn http_status_code(&self) -> u16 {
        static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            CatalogError::MissingIdentifier => {
                "Provide one of key, filePath, name or file_name".to_string()
            }
            CatalogError::NotFound(ref identifier) => format!("File not found: {}", identifier),
            CatalogError::Unresolvable { ref identifier, .. } => {
                format!("Could not delete '{}'", identifier)
            }
            CatalogError::Storage(StorageError::InvalidKey(ref msg)) => msg.clone(),
            CatalogError::Storage(_) => "Failed to access storage".to_string(),
            CatalogError::Store(_) | CatalogError::Serialization(_) | CatalogError::Io(_) => {
                "Failed to access catalog".to_string()
            }
        }
    }
}
