//! Persisted catalog stores.
//!
//! A store keeps one entry list per owner scope. `None` is the shared scope.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use marquee_core::CatalogEntry;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{CatalogError, CatalogResult};
use crate::reconcile::entry_basename;

/// Document key used for the shared (global) scope.
pub const SHARED_SCOPE: &str = "_shared";

fn scope_key(owner: Option<&str>) -> String {
    match owner.map(str::trim).filter(|o| !o.is_empty()) {
        Some(owner) => owner.to_string(),
        None => SHARED_SCOPE.to_string(),
    }
}

fn without_basename(entries: &[CatalogEntry], basename: &str) -> Option<Vec<CatalogEntry>> {
    let kept: Vec<CatalogEntry> = entries
        .iter()
        .filter(|entry| entry_basename(entry).as_deref() != Some(basename))
        .cloned()
        .collect();
    (kept.len() != entries.len()).then_some(kept)
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Persisted entries for a scope, or `None` when nothing was ever saved.
    async fn get(&self, owner: Option<&str>) -> CatalogResult<Option<Vec<CatalogEntry>>>;

    async fn save(&self, owner: Option<&str>, entries: &[CatalogEntry]) -> CatalogResult<()>;

    /// Drop every entry whose basename is `basename`. Returns whether anything
    /// was removed.
    async fn remove_by_basename(&self, owner: Option<&str>, basename: &str) -> CatalogResult<bool>;
}

/// Process-local store, used by tests and the CLI's dry runs.
#[derive(Default)]
pub struct InMemoryCatalogStore {
    scopes: RwLock<HashMap<String, Vec<CatalogEntry>>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn get(&self, owner: Option<&str>) -> CatalogResult<Option<Vec<CatalogEntry>>> {
        Ok(self.scopes.read().await.get(&scope_key(owner)).cloned())
    }

    async fn save(&self, owner: Option<&str>, entries: &[CatalogEntry]) -> CatalogResult<()> {
        self.scopes
            .write()
            .await
            .insert(scope_key(owner), entries.to_vec());
        Ok(())
    }

    async fn remove_by_basename(&self, owner: Option<&str>, basename: &str) -> CatalogResult<bool> {
        let mut scopes = self.scopes.write().await;
        let Some(entries) = scopes.get_mut(&scope_key(owner)) else {
            return Ok(false);
        };
        match without_basename(entries, basename) {
            Some(kept) => {
                *entries = kept;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

type Document = BTreeMap<String, Vec<CatalogEntry>>;

/// All scopes in one JSON document on disk. Writes go to a temp file that is
/// renamed over the original, so readers never see a partial document.
pub struct JsonFileCatalogStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFileCatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> CatalogResult<Document> {
        match fs::read(&self.path).await {
            Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => Ok(Document::new()),
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, document: &Document) -> CatalogResult<()> {
        let start = std::time::Instant::now();
        let raw = serde_json::to_vec_pretty(document)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                CatalogError::Store(format!("Invalid catalog path {}", self.path.display()))
            })?;
        let temp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        let mut file = fs::File::create(&temp).await?;
        file.write_all(&raw).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp, &self.path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        tracing::debug!(
            path = %self.path.display(),
            size_bytes = raw.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Catalog document written"
        );
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for JsonFileCatalogStore {
    async fn get(&self, owner: Option<&str>) -> CatalogResult<Option<Vec<CatalogEntry>>> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        Ok(document.remove(&scope_key(owner)))
    }

    async fn save(&self, owner: Option<&str>, entries: &[CatalogEntry]) -> CatalogResult<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        document.insert(scope_key(owner), entries.to_vec());
        self.persist(&document).await
    }

    async fn remove_by_basename(&self, owner: Option<&str>, basename: &str) -> CatalogResult<bool> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        let Some(entries) = document.get_mut(&scope_key(owner)) else {
            return Ok(false);
        };
        let Some(kept) = without_basename(entries, basename) else {
            return Ok(false);
        };
        *entries = kept;
        self.persist(&document).await?;
        Ok(true)
    }
}
