//! Catalog reconciliation.
//!
//! Storage is the source of truth for existence, `url`, `owner_folder` and
//! `deletable`; the persisted catalog is the source of truth for `uses` and
//! `active`. Matching is by basename only (case-sensitive), so a file moved
//! between the flat and the per-owner layout keeps its catalog metadata.

use std::collections::{HashMap, HashSet};

use marquee_core::{CatalogEntry, LiveObject};
use marquee_storage::reference_basename;
use serde::Serialize;

/// Outcome of one reconciliation pass. Owned by the request that produced it.
///
/// Every live object lands in exactly one of `matched`, `newly_discovered` or
/// `shadowed`. Every persisted entry lands in exactly one of `matched`,
/// `orphaned` or `duplicates`, except entries with no derivable basename,
/// which are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    /// Persisted entries found in storage, already merged with the live state.
    pub matched: Vec<(CatalogEntry, LiveObject)>,
    pub newly_discovered: Vec<LiveObject>,
    /// Persisted entries whose file is gone from storage.
    pub orphaned: Vec<CatalogEntry>,
    /// Live objects that lost a basename collision to a later object.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shadowed: Vec<LiveObject>,
    /// Persisted entries naming a file an earlier entry already matched. The
    /// file exists, so they are not orphans; they collapse into that entry.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duplicates: Vec<CatalogEntry>,
}

impl ReconciliationResult {
    /// The catalog as a client sees it: matched entries in persisted order,
    /// then newly discovered files with default metadata. Orphans never appear.
    pub fn movies<F>(&self, url_for: F) -> Vec<CatalogEntry>
    where
        F: Fn(&str) -> String,
    {
        self.movies_where(url_for, |_| true)
    }

    /// Like [`Self::movies`], listing only the newly discovered files `show`
    /// accepts. Matched entries are always kept.
    pub fn movies_where<F, P>(&self, url_for: F, show: P) -> Vec<CatalogEntry>
    where
        F: Fn(&str) -> String,
        P: Fn(&LiveObject) -> bool,
    {
        self.matched
            .iter()
            .map(|(entry, _)| entry.clone())
            .chain(
                self.newly_discovered
                    .iter()
                    .filter(|object| show(object))
                    .map(|object| CatalogEntry::discovered(object, url_for(&object.key))),
            )
            .collect()
    }
}

/// Basename a persisted entry refers to: `file_name`, or for legacy entries
/// that only recorded a URL, the last segment of that URL.
pub fn entry_basename(entry: &CatalogEntry) -> Option<String> {
    [entry.file_name.as_deref(), entry.url.as_deref()]
        .into_iter()
        .flatten()
        .map(reference_basename)
        .find(|name| !name.is_empty())
}

/// Merge `persisted` with a live listing. Pure: nothing is read or written.
///
/// `url_for` builds the public URL of a live key.
pub fn reconcile<F>(
    persisted: &[CatalogEntry],
    live: &[LiveObject],
    url_for: F,
) -> ReconciliationResult
where
    F: Fn(&str) -> String,
{
    let mut result = ReconciliationResult::default();

    // Last write wins on basename collisions.
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(live.len());
    for (position, object) in live.iter().enumerate() {
        if let Some(previous) = index.insert(object.basename.as_str(), position) {
            result.shadowed.push(live[previous].clone());
        }
    }

    if !result.shadowed.is_empty() {
        tracing::debug!(
            shadowed = result.shadowed.len(),
            "Live listing contains basename collisions"
        );
    }

    let mut claimed: HashSet<&str> = HashSet::new();
    let mut dropped = 0usize;
    for entry in persisted {
        let Some(name) = entry_basename(entry) else {
            dropped += 1;
            continue;
        };

        match index.get_key_value(name.as_str()) {
            Some((&basename, &position)) => {
                if !claimed.insert(basename) {
                    result.duplicates.push(entry.clone());
                    continue;
                }
                let object = &live[position];
                let merged = CatalogEntry {
                    file_name: Some(object.basename.clone()),
                    url: Some(url_for(&object.key)),
                    owner_folder: object.owner_folder.clone(),
                    deletable: object.owner_folder.is_some(),
                    uses: entry.uses,
                    active: entry.active,
                    missing_passes: 0,
                };
                result.matched.push((merged, object.clone()));
            }
            None => {
                let mut orphan = entry.clone();
                if orphan.file_name.is_none() {
                    orphan.file_name = Some(name);
                }
                result.orphaned.push(orphan);
            }
        }
    }

    if dropped > 0 {
        tracing::debug!(dropped, "Dropped catalog entries with no file name");
    }
    if !result.duplicates.is_empty() {
        tracing::debug!(
            duplicates = result.duplicates.len(),
            "Collapsed duplicate catalog entries"
        );
    }

    result.newly_discovered = live
        .iter()
        .enumerate()
        .filter(|(position, object)| {
            index.get(object.basename.as_str()) == Some(position)
                && !claimed.contains(object.basename.as_str())
        })
        .map(|(_, object)| object.clone())
        .collect();

    result
}
