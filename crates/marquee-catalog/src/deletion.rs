//! Verified, idempotent deletion by client identifier.
//!
//! Candidates come from [`KeyNormalizer::candidate_keys_for`]: the identifier
//! as an absolute key, then the owner-scoped key, then the flat key. Only a
//! candidate that exists is deleted, and success means the post-delete probe
//! saw it gone. A listing-based basename search is the last resort.

use std::sync::Arc;

use marquee_storage::{basename, KeyNormalizer, Storage};
use serde::Serialize;

use crate::error::{CatalogError, CatalogResult};
use crate::store::CatalogStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted { key: String },
    /// No candidate existed and no backend call failed.
    AlreadyAbsent,
}

enum Attempt {
    Deleted,
    Missing,
    Failed(String),
}

pub struct DeletionCoordinator {
    storage: Arc<dyn Storage>,
    normalizer: KeyNormalizer,
    catalog: Arc<dyn CatalogStore>,
    strict: bool,
}

impl DeletionCoordinator {
    /// `normalizer` learns the storage's public URL base, so the storage's
    /// own URLs resolve to the keys they were built from.
    pub fn new(
        storage: Arc<dyn Storage>,
        normalizer: KeyNormalizer,
        catalog: Arc<dyn CatalogStore>,
    ) -> Self {
        let normalizer = normalizer.with_public_url_base(&storage.public_url_base());
        Self {
            storage,
            normalizer,
            catalog,
            strict: false,
        }
    }

    /// In strict mode a file that is already gone is reported as not found.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    async fn attempt(&self, key: &str) -> Attempt {
        match self.storage.exists(key).await {
            Ok(false) => return Attempt::Missing,
            Ok(true) => {}
            Err(e) => return Attempt::Failed(format!("{}: probe failed: {}", key, e)),
        }

        match self.storage.delete(key).await {
            Ok(true) => Attempt::Deleted,
            Ok(false) => Attempt::Failed(format!("{}: still present after delete", key)),
            Err(e) => Attempt::Failed(format!("{}: {}", key, e)),
        }
    }

    /// Listing-based fallback. With an owner, only that owner's folder and the
    /// flat layout qualify; without one the match must be unique.
    async fn suffix_candidates(
        &self,
        identifier: &str,
        owner: Option<&str>,
        tried: &[String],
        failures: &mut Vec<String>,
    ) -> Vec<String> {
        let root = self.normalizer.folder_key(None);
        let listing = match self.storage.list(&root).await {
            Ok(listing) => listing,
            Err(e) => {
                failures.push(format!("{}: listing failed: {}", root, e));
                return Vec::new();
            }
        };

        let matches: Vec<String> = self
            .normalizer
            .suffix_matches(identifier, &listing)
            .into_iter()
            .filter(|key| !tried.contains(key))
            .filter(|key| match owner {
                Some(owner) => self
                    .normalizer
                    .owner_folder_of(key)
                    .map_or(true, |folder| folder == owner),
                None => true,
            })
            .collect();

        if owner.is_none() && matches.len() > 1 {
            tracing::warn!(
                identifier = %identifier,
                matches = ?matches,
                "Ambiguous file name across owners, refusing to guess"
            );
            failures.push(format!(
                "'{}' matches {} files in different folders",
                identifier,
                matches.len()
            ));
            return Vec::new();
        }
        matches
    }

    #[tracing::instrument(skip(self), fields(strict = self.strict))]
    pub async fn delete_by_identifier(
        &self,
        identifier: &str,
        owner: Option<&str>,
    ) -> CatalogResult<DeleteOutcome> {
        if identifier.trim().is_empty() {
            return Err(CatalogError::MissingIdentifier);
        }

        let candidates = self.normalizer.candidate_keys_for(identifier, owner);
        if candidates.is_empty() {
            return Err(CatalogError::Unresolvable {
                identifier: identifier.to_string(),
                reason: "identifier does not name a file".to_string(),
            });
        }

        let mut failures = Vec::new();
        let mut deleted = None;

        for candidate in &candidates {
            match self.attempt(candidate).await {
                Attempt::Deleted => {
                    deleted = Some(candidate.clone());
                    break;
                }
                Attempt::Missing => {}
                Attempt::Failed(reason) => {
                    tracing::warn!(key = %candidate, reason = %reason, "Delete candidate failed");
                    failures.push(reason);
                }
            }
        }

        if deleted.is_none() {
            for candidate in self
                .suffix_candidates(identifier, owner, &candidates, &mut failures)
                .await
            {
                match self.attempt(&candidate).await {
                    Attempt::Deleted => {
                        deleted = Some(candidate);
                        break;
                    }
                    Attempt::Missing => {}
                    Attempt::Failed(reason) => {
                        tracing::warn!(key = %candidate, reason = %reason, "Delete candidate failed");
                        failures.push(reason);
                    }
                }
            }
        }

        let outcome = match deleted {
            Some(key) => DeleteOutcome::Deleted { key },
            None if failures.is_empty() => DeleteOutcome::AlreadyAbsent,
            None => {
                tracing::error!(
                    identifier = %identifier,
                    failures = ?failures,
                    "No delete candidate could be resolved"
                );
                return Err(CatalogError::Unresolvable {
                    identifier: identifier.to_string(),
                    reason: failures.join("; "),
                });
            }
        };

        // The catalog entry may record a stale layout, so it is matched by
        // basename rather than key. The deleted key's own owner scope is
        // cleaned too when it differs from the hint.
        let (name, key_owner) = match &outcome {
            DeleteOutcome::Deleted { key } => {
                (basename(key).to_string(), self.normalizer.owner_folder_of(key))
            }
            DeleteOutcome::AlreadyAbsent => (basename(&candidates[0]).to_string(), None),
        };
        let mut scopes = vec![owner.map(str::to_string)];
        if key_owner.is_some() && key_owner.as_deref() != owner {
            scopes.push(key_owner);
        }
        for scope in &scopes {
            if let Err(e) = self.catalog.remove_by_basename(scope.as_deref(), &name).await {
                tracing::warn!(
                    error = %e,
                    basename = %name,
                    scope = ?scope,
                    "Failed to drop catalog entry after delete"
                );
            }
        }

        match &outcome {
            DeleteOutcome::Deleted { key } => tracing::info!(key = %key, "File deleted"),
            DeleteOutcome::AlreadyAbsent if self.strict => {
                return Err(CatalogError::NotFound(identifier.to_string()));
            }
            DeleteOutcome::AlreadyAbsent => tracing::info!("File already absent"),
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCatalogStore;
    use bytes::Bytes;
    use marquee_core::CatalogEntry;
    use marquee_storage::LocalStorage;
    use tempfile::{tempdir, TempDir};

    async fn setup(keys: &[&str]) -> (TempDir, Arc<dyn Storage>, Arc<InMemoryCatalogStore>) {
        let dir = tempdir().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(
            LocalStorage::new(dir.path(), "/public".to_string())
                .await
                .unwrap(),
        );
        for key in keys {
            storage
                .write(key, Bytes::from_static(b"x"), "video/mp4")
                .await
                .unwrap();
        }
        (dir, storage, Arc::new(InMemoryCatalogStore::new()))
    }

    fn coordinator(
        storage: &Arc<dyn Storage>,
        catalog: &Arc<InMemoryCatalogStore>,
    ) -> DeletionCoordinator {
        DeletionCoordinator::new(storage.clone(), KeyNormalizer::new("movies"), catalog.clone())
    }

    #[tokio::test]
    async fn test_owner_scoped_key_wins_collision() {
        let (_dir, storage, catalog) = setup(&["movies/42/clip.mp4", "movies/clip.mp4"]).await;

        let outcome = coordinator(&storage, &catalog)
            .delete_by_identifier("clip.mp4", Some("42"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DeleteOutcome::Deleted {
                key: "movies/42/clip.mp4".to_string()
            }
        );
        assert!(storage.exists("movies/clip.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn test_falls_back_to_flat_layout() {
        let (_dir, storage, catalog) = setup(&["movies/clip.mp4"]).await;

        let outcome = coordinator(&storage, &catalog)
            .delete_by_identifier("clip.mp4", Some("42"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DeleteOutcome::Deleted {
                key: "movies/clip.mp4".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_url_identifier() {
        let (_dir, storage, catalog) = setup(&["movies/9/my clip.mp4"]).await;

        let outcome = coordinator(&storage, &catalog)
            .delete_by_identifier("http://localhost:3000/movies/9/my%20clip.mp4", None)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DeleteOutcome::Deleted {
                key: "movies/9/my clip.mp4".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_own_public_url_never_falls_through_to_shared_copy() {
        let (_dir, storage, catalog) = setup(&["movies/9/a.mp4", "movies/a.mp4"]).await;
        let url = storage.public_url("movies/9/a.mp4");
        assert_eq!(url, "/public/movies/9/a.mp4");

        let outcome = coordinator(&storage, &catalog)
            .delete_by_identifier(&url, None)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DeleteOutcome::Deleted {
                key: "movies/9/a.mp4".to_string()
            }
        );
        assert!(!storage.exists("movies/9/a.mp4").await.unwrap());
        assert!(storage.exists("movies/a.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn test_idempotent_delete() {
        let (_dir, storage, catalog) = setup(&["movies/7/a.mp4"]).await;
        let coordinator = coordinator(&storage, &catalog);

        let first = coordinator.delete_by_identifier("a.mp4", Some("7")).await.unwrap();
        assert!(matches!(first, DeleteOutcome::Deleted { .. }));

        let second = coordinator.delete_by_identifier("a.mp4", Some("7")).await.unwrap();
        assert_eq!(second, DeleteOutcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn test_strict_mode_reports_not_found() {
        let (_dir, storage, catalog) = setup(&[]).await;

        let err = coordinator(&storage, &catalog)
            .with_strict(true)
            .delete_by_identifier("nope.mp4", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_suffix_search_finds_nested_key() {
        let (_dir, storage, catalog) = setup(&["movies/7/season1/ep.mp4"]).await;

        let outcome = coordinator(&storage, &catalog)
            .delete_by_identifier("ep.mp4", Some("7"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DeleteOutcome::Deleted {
                key: "movies/7/season1/ep.mp4".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_suffix_search_stays_out_of_other_owners() {
        let (_dir, storage, catalog) = setup(&["movies/8/clip.mp4"]).await;

        let outcome = coordinator(&storage, &catalog)
            .delete_by_identifier("clip.mp4", Some("7"))
            .await
            .unwrap();

        assert_eq!(outcome, DeleteOutcome::AlreadyAbsent);
        assert!(storage.exists("movies/8/clip.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn test_ambiguous_name_without_owner_is_unresolvable() {
        let (_dir, storage, catalog) = setup(&["movies/8/clip.mp4", "movies/9/clip.mp4"]).await;

        let err = coordinator(&storage, &catalog)
            .delete_by_identifier("clip.mp4", None)
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Unresolvable { .. }));
        assert!(storage.exists("movies/8/clip.mp4").await.unwrap());
        assert!(storage.exists("movies/9/clip.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn test_catalog_entry_removed_by_basename() {
        let (_dir, storage, catalog) = setup(&["movies/7/a.mp4"]).await;
        let legacy = CatalogEntry {
            file_name: None,
            ..CatalogEntry::new("x").with_url("https://old.example/uploads/a.mp4")
        };
        catalog
            .save(Some("7"), &[legacy, CatalogEntry::new("b.mp4")])
            .await
            .unwrap();

        coordinator(&storage, &catalog)
            .delete_by_identifier("a.mp4", Some("7"))
            .await
            .unwrap();

        assert_eq!(
            catalog.get(Some("7")).await.unwrap(),
            Some(vec![CatalogEntry::new("b.mp4")])
        );
    }

    #[tokio::test]
    async fn test_ownerless_delete_cleans_owner_catalog() {
        let (_dir, storage, catalog) = setup(&["movies/7/x.mp4"]).await;
        catalog
            .save(Some("7"), &[CatalogEntry::new("x.mp4"), CatalogEntry::new("y.mp4")])
            .await
            .unwrap();
        catalog.save(None, &[CatalogEntry::new("x.mp4")]).await.unwrap();

        coordinator(&storage, &catalog)
            .delete_by_identifier("movies/7/x.mp4", None)
            .await
            .unwrap();

        assert_eq!(
            catalog.get(Some("7")).await.unwrap(),
            Some(vec![CatalogEntry::new("y.mp4")])
        );
        assert_eq!(catalog.get(None).await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn test_folder_identifier_is_unresolvable() {
        let (_dir, storage, catalog) = setup(&[]).await;
        let err = coordinator(&storage, &catalog)
            .delete_by_identifier("movies/7/", Some("7"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Unresolvable { .. }));

        let err = coordinator(&storage, &catalog)
            .delete_by_identifier("  ", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::MissingIdentifier));
    }
}
