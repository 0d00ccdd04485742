//! Request-scoped catalog operations.
//!
//! Every call takes the owner explicitly; the service holds only shared,
//! read-only collaborators and may serve concurrent requests for different
//! owners.

use std::sync::Arc;

use bytes::Bytes;
use marquee_core::{CatalogEntry, Config, LiveObject};
use marquee_storage::{reference_basename, KeyNormalizer, Storage};
use serde::Serialize;

use crate::deletion::{DeleteOutcome, DeletionCoordinator};
use crate::error::{CatalogError, CatalogResult};
use crate::reconcile::{reconcile, ReconciliationResult};
use crate::request::DeleteRequest;
use crate::store::CatalogStore;

const DEFAULT_ORPHAN_GRACE_PASSES: u32 = 3;

/// What a client sees for one owner scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogView {
    pub movies: Vec<CatalogEntry>,
    /// The live listing failed and `movies` is the persisted catalog as-is.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub key: String,
    pub url: String,
}

struct Composition {
    view: CatalogView,
    /// `None` when the listing was unavailable.
    result: Option<ReconciliationResult>,
    store_failed: bool,
}

pub struct CatalogService {
    storage: Arc<dyn Storage>,
    normalizer: KeyNormalizer,
    store: Arc<dyn CatalogStore>,
    deletion: DeletionCoordinator,
    allowed_extensions: Vec<String>,
    orphan_grace_passes: u32,
}

impl CatalogService {
    pub fn new(
        storage: Arc<dyn Storage>,
        normalizer: KeyNormalizer,
        store: Arc<dyn CatalogStore>,
    ) -> Self {
        let normalizer = normalizer.with_public_url_base(&storage.public_url_base());
        let deletion = DeletionCoordinator::new(storage.clone(), normalizer.clone(), store.clone());
        Self {
            storage,
            normalizer,
            store,
            deletion,
            allowed_extensions: Vec::new(),
            orphan_grace_passes: DEFAULT_ORPHAN_GRACE_PASSES,
        }
    }

    pub fn from_config(
        config: &Config,
        storage: Arc<dyn Storage>,
        store: Arc<dyn CatalogStore>,
    ) -> Self {
        let normalizer = marquee_storage::create_normalizer(config);
        Self::new(storage, normalizer, store)
            .with_allowed_extensions(config.allowed_extensions().to_vec())
            .with_orphan_grace_passes(config.orphan_grace_passes())
            .with_strict_delete(config.strict_delete())
    }

    /// Lowercase extensions without dots that newly discovered files must
    /// have to be listed. Empty allows every file. Files the catalog already
    /// knows are listed whatever their extension.
    pub fn with_allowed_extensions(mut self, extensions: Vec<String>) -> Self {
        self.allowed_extensions = extensions;
        self
    }

    pub fn with_orphan_grace_passes(mut self, passes: u32) -> Self {
        self.orphan_grace_passes = passes;
        self
    }

    pub fn with_strict_delete(mut self, strict: bool) -> Self {
        self.deletion = self.deletion.with_strict(strict);
        self
    }

    pub fn normalizer(&self) -> &KeyNormalizer {
        &self.normalizer
    }

    fn is_allowed(&self, object: &LiveObject) -> bool {
        self.allowed_extensions.is_empty()
            || object
                .extension
                .as_ref()
                .is_some_and(|ext| self.allowed_extensions.contains(ext))
    }

    /// Live objects visible to `owner`: its own folder and the shared flat
    /// layout. The global scope sees everything. Owner-scoped objects sort
    /// last so they win basename collisions.
    fn scope_objects(&self, keys: &[String], owner: Option<&str>) -> Vec<LiveObject> {
        let owner = owner.map(str::trim).filter(|o| !o.is_empty());
        let mut objects: Vec<LiveObject> = keys
            .iter()
            .map(|key| self.normalizer.live_object(key))
            .filter(|object| match (owner, object.owner_folder.as_deref()) {
                (Some(owner), Some(folder)) => folder == owner,
                _ => true,
            })
            .collect();
        objects.sort_by_key(|object| object.owner_folder.is_some());
        objects
    }

    async fn compose(&self, owner: Option<&str>) -> Composition {
        let (persisted, store_failed) = match self.store.get(owner).await {
            Ok(persisted) => (persisted.unwrap_or_default(), false),
            Err(e) => {
                tracing::warn!(error = %e, "Catalog store unavailable, treating catalog as empty");
                (Vec::new(), true)
            }
        };

        let root = self.normalizer.folder_key(None);
        match self.storage.list(&root).await {
            Ok(keys) => {
                let live = self.scope_objects(&keys, owner);
                let url_for = |key: &str| self.storage.public_url(key);
                let result = reconcile(&persisted, &live, url_for);

                tracing::info!(
                    persisted = persisted.len(),
                    live = live.len(),
                    matched = result.matched.len(),
                    discovered = result.newly_discovered.len(),
                    orphaned = result.orphaned.len(),
                    "Catalog reconciled"
                );

                Composition {
                    view: CatalogView {
                        movies: result
                            .movies_where(url_for, |object| self.is_allowed(object)),
                        degraded: false,
                    },
                    result: Some(result),
                    store_failed,
                }
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    prefix = %root,
                    "Storage listing unavailable, serving persisted catalog"
                );
                Composition {
                    view: CatalogView {
                        movies: persisted,
                        degraded: true,
                    },
                    result: None,
                    store_failed,
                }
            }
        }
    }

    /// Reconciled catalog for `owner`. Never fails: a failed listing degrades
    /// to the persisted catalog, a failed store read to storage alone.
    #[tracing::instrument(skip(self))]
    pub async fn catalog_view(&self, owner: Option<&str>) -> CatalogView {
        self.compose(owner).await.view
    }

    /// Reconcile and write the result back. Orphans stay persisted, counting
    /// missed passes, until they reach the grace limit.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self, owner: Option<&str>) -> CatalogResult<CatalogView> {
        let composition = self.compose(owner).await;
        if composition.store_failed {
            return Err(CatalogError::Store(
                "persisted catalog could not be read; not overwriting it".to_string(),
            ));
        }
        let Some(result) = composition.result else {
            tracing::warn!("Skipping catalog write-back on a degraded listing");
            return Ok(composition.view);
        };

        let mut entries = composition.view.movies.clone();
        let mut expired = 0usize;
        for mut orphan in result.orphaned {
            orphan.missing_passes = orphan.missing_passes.saturating_add(1);
            if orphan.missing_passes >= self.orphan_grace_passes {
                expired += 1;
            } else {
                entries.push(orphan);
            }
        }

        self.store.save(owner, &entries).await?;

        tracing::info!(
            saved = entries.len(),
            expired_orphans = expired,
            "Catalog refreshed"
        );
        Ok(composition.view)
    }

    /// Create `{root}/{owner}/` when an owner is first seen. Best-effort.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_owner_folder(&self, owner: &str) -> bool {
        let owner = owner.trim();
        if owner.is_empty() {
            return false;
        }
        let folder = self.normalizer.folder_key(Some(owner));
        match self.storage.create_folder(&folder).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, folder = %folder, "Could not create owner folder");
                false
            }
        }
    }

    /// Server-mediated upload into the owner's folder (or the flat layout).
    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn store_file(
        &self,
        owner: Option<&str>,
        file_name: &str,
        data: Bytes,
        content_type: &str,
    ) -> CatalogResult<StoredFile> {
        let name = reference_basename(file_name);
        if name.is_empty() {
            return Err(CatalogError::MissingIdentifier);
        }

        let key = self.normalizer.file_key(owner, &name);
        let key = self.storage.write(&key, data, content_type).await?;
        let url = self.storage.public_url(&key);
        Ok(StoredFile { key, url })
    }

    pub async fn delete(&self, request: &DeleteRequest) -> CatalogResult<DeleteOutcome> {
        self.deletion
            .delete_by_identifier(&request.identifier, request.owner())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCatalogStore;
    use marquee_storage::LocalStorage;
    use tempfile::{tempdir, TempDir};

    async fn service() -> (TempDir, CatalogService, Arc<InMemoryCatalogStore>) {
        let dir = tempdir().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(
            LocalStorage::new(dir.path(), "/public".to_string())
                .await
                .unwrap(),
        );
        let store = Arc::new(InMemoryCatalogStore::new());
        let service = CatalogService::new(storage, KeyNormalizer::new("movies"), store.clone())
            .with_allowed_extensions(vec!["mp4".to_string()]);
        (dir, service, store)
    }

    #[tokio::test]
    async fn test_store_file_uses_owner_layout() {
        let (_dir, service, _) = service().await;

        let stored = service
            .store_file(Some("7"), "../../clip.mp4", Bytes::from_static(b"x"), "video/mp4")
            .await
            .unwrap();
        assert_eq!(stored.key, "movies/7/clip.mp4");
        assert_eq!(stored.url, "/public/movies/7/clip.mp4");

        let err = service
            .store_file(None, "movies/", Bytes::new(), "video/mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::MissingIdentifier));
    }

    #[tokio::test]
    async fn test_view_filters_extensions_and_other_owners() {
        let (_dir, service, _) = service().await;
        for (owner, name) in [
            (Some("7"), "a.mp4"),
            (Some("8"), "other.mp4"),
            (None, "shared.mp4"),
            (None, "notes.txt"),
        ] {
            service
                .store_file(owner, name, Bytes::from_static(b"x"), "video/mp4")
                .await
                .unwrap();
        }

        let view = service.catalog_view(Some("7")).await;
        let names: Vec<_> = view
            .movies
            .iter()
            .filter_map(|m| m.file_name.clone())
            .collect();
        assert_eq!(names, vec!["shared.mp4", "a.mp4"]);
        assert!(!view.degraded);
    }

    #[tokio::test]
    async fn test_owner_copy_wins_collision_in_view() {
        let (_dir, service, _) = service().await;
        service
            .store_file(None, "clip.mp4", Bytes::from_static(b"x"), "video/mp4")
            .await
            .unwrap();
        service
            .store_file(Some("7"), "clip.mp4", Bytes::from_static(b"x"), "video/mp4")
            .await
            .unwrap();

        let view = service.catalog_view(Some("7")).await;
        assert_eq!(view.movies.len(), 1);
        assert_eq!(view.movies[0].owner_folder.as_deref(), Some("7"));
        assert!(view.movies[0].deletable);
    }

    #[tokio::test]
    async fn test_refresh_ages_out_orphans() {
        let (_dir, service, store) = service().await;
        let service = service.with_orphan_grace_passes(2);
        store
            .save(Some("7"), &[CatalogEntry::new("gone.mp4").with_uses(5)])
            .await
            .unwrap();

        service.refresh(Some("7")).await.unwrap();
        let saved = store.get(Some("7")).await.unwrap().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].missing_passes, 1);
        assert_eq!(saved[0].uses, 5);

        // still hidden from the view while it waits out the grace period
        assert!(service.catalog_view(Some("7")).await.movies.is_empty());

        service.refresh(Some("7")).await.unwrap();
        assert_eq!(store.get(Some("7")).await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn test_known_file_outside_extension_filter_is_never_orphaned() {
        let (_dir, service, store) = service().await;
        let service = service.with_orphan_grace_passes(3);
        service
            .store_file(Some("7"), "trailer.m4v", Bytes::from_static(b"x"), "video/mp4")
            .await
            .unwrap();
        service
            .store_file(Some("7"), "extra.m4v", Bytes::from_static(b"x"), "video/mp4")
            .await
            .unwrap();
        store
            .save(Some("7"), &[CatalogEntry::new("trailer.m4v").with_uses(8)])
            .await
            .unwrap();

        for _ in 0..3 {
            service.refresh(Some("7")).await.unwrap();
        }

        let saved = store.get(Some("7")).await.unwrap().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].file_name.as_deref(), Some("trailer.m4v"));
        assert_eq!(saved[0].uses, 8);
        assert_eq!(saved[0].missing_passes, 0);

        // unknown files are still held to the filter
        let names: Vec<_> = service
            .catalog_view(Some("7"))
            .await
            .movies
            .into_iter()
            .filter_map(|m| m.file_name)
            .collect();
        assert_eq!(names, vec!["trailer.m4v"]);
    }

    #[tokio::test]
    async fn test_refresh_collapses_duplicate_entries() {
        let (_dir, service, store) = service().await;
        service
            .store_file(None, "a.mp4", Bytes::from_static(b"x"), "video/mp4")
            .await
            .unwrap();
        store
            .save(
                None,
                &[
                    CatalogEntry::new("a.mp4").with_uses(4),
                    CatalogEntry::new("a.mp4").with_uses(1),
                ],
            )
            .await
            .unwrap();

        service.refresh(None).await.unwrap();

        let saved = store.get(None).await.unwrap().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].uses, 4);
    }

    #[tokio::test]
    async fn test_returning_file_resets_missing_passes() {
        let (_dir, service, store) = service().await;
        let mut entry = CatalogEntry::new("back.mp4").with_uses(4);
        entry.missing_passes = 2;
        store.save(None, &[entry]).await.unwrap();

        service
            .store_file(None, "back.mp4", Bytes::from_static(b"x"), "video/mp4")
            .await
            .unwrap();
        service.refresh(None).await.unwrap();

        let saved = store.get(None).await.unwrap().unwrap();
        assert_eq!(saved[0].missing_passes, 0);
        assert_eq!(saved[0].uses, 4);
    }

    #[tokio::test]
    async fn test_ensure_owner_folder() {
        let (dir, service, _) = service().await;
        assert!(service.ensure_owner_folder("42").await);
        assert!(dir.path().join("movies/42").is_dir());
        assert!(!service.ensure_owner_folder("  ").await);
    }
}
