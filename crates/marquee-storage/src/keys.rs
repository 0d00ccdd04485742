//! Key normalization shared by every storage backend.
//!
//! Key format: `{root}/{file}` for the shared (legacy flat) layout, and
//! `{root}/{owner}/{file}` for the per-owner layout. Both layouts coexist in
//! storage and must resolve forever.
//!
//! Client references arrive as full URLs, absolute paths, bare names, legacy
//! `uploads/...` keys or foldered keys. [`KeyNormalizer::normalize`] collapses
//! all of them to one canonical key: forward-slash delimited, no leading slash,
//! no `..` or `.` segments, no empty segments, percent-decoded and with `+`
//! read as a space. Normalization never fails and is idempotent.

use std::sync::LazyLock;

use marquee_core::LiveObject;
use regex::Regex;

/// Prefix older upload flows wrote in front of every key.
pub const LEGACY_UPLOAD_PREFIX: &str = "uploads";

/// Basename of the zero-byte object written where a backend has no folders.
pub const FOLDER_MARKER: &str = ".keep";

static ABSOLUTE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://[^/?#]*([^?#]*)").expect("valid URL pattern")
});

/// A rewrite that changed the meaning of the input rather than its spelling.
/// Reported for observability only; normalization still succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
    UrlReducedToPath,
    LegacyPrefixStripped,
    TraversalRemoved,
    UndecodablePercentEscape,
}

/// Result of a normalization, with the degradations it applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedKey {
    pub key: String,
    pub degradations: Vec<Degradation>,
}

/// Deterministic mapping from client-supplied identifiers to canonical keys
/// under one root prefix.
#[derive(Debug, Clone)]
pub struct KeyNormalizer {
    root_segments: Vec<String>,
    legacy_prefixes: Vec<Vec<String>>,
    /// Path segments a backend puts in front of keys in its public URLs.
    url_bases: Vec<Vec<String>>,
}

impl KeyNormalizer {
    pub fn new(root_prefix: &str) -> Self {
        Self {
            root_segments: segments_of(root_prefix),
            legacy_prefixes: vec![vec![LEGACY_UPLOAD_PREFIX.to_string()]],
            url_bases: Vec::new(),
        }
    }

    /// Replace the legacy prefixes stripped from incoming identifiers. A
    /// prefix may span several segments (`public/uploads`).
    pub fn with_legacy_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.legacy_prefixes = prefixes
            .into_iter()
            .map(|p| segments_of(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    /// Register the base a storage backend builds public URLs from (see
    /// [`crate::Storage::public_url_base`]). URLs and absolute paths under
    /// that base resolve to the key they were built from. Bases without a
    /// path component are ignored.
    pub fn with_public_url_base(mut self, base: &str) -> Self {
        let path = match ABSOLUTE_URL.captures(base.trim()) {
            Some(captures) => captures.get(1).map_or("", |m| m.as_str()).to_string(),
            None => base.trim().to_string(),
        };
        let segments = segments_of(&percent_decode_fully(&path).0);
        if !segments.is_empty() && !self.url_bases.contains(&segments) {
            self.url_bases.push(segments);
        }
        self
    }

    /// Root prefix without surrounding slashes.
    pub fn root_prefix(&self) -> String {
        self.root_segments.join("/")
    }

    /// Canonical key for a file reference.
    pub fn normalize(&self, input: &str) -> String {
        self.normalize_report(input, false).key
    }

    /// Canonical folder key (always ends with `/`).
    pub fn normalize_folder(&self, input: &str) -> String {
        self.normalize_report(input, true).key
    }

    pub fn normalize_report(&self, input: &str, is_folder: bool) -> NormalizedKey {
        let mut degradations = Vec::new();
        let mut value = input.trim().to_string();

        let url_path = ABSOLUTE_URL
            .captures(&value)
            .map(|c| c.get(1).map_or("", |m| m.as_str()).to_string());
        let located = url_path.is_some() || value.starts_with('/');
        if let Some(path) = url_path {
            value = path;
            degradations.push(Degradation::UrlReducedToPath);
        }

        if let Some(stripped) = value.strip_prefix('/') {
            value = stripped.to_string();
        }

        let (decoded, clean) = percent_decode_fully(&value);
        if !clean {
            degradations.push(Degradation::UndecodablePercentEscape);
        }
        let value = decoded.replace('+', " ");

        let trailing_slash = value.ends_with('/');
        let raw_segments: Vec<&str> = value.split('/').map(str::trim).collect();
        if raw_segments.iter().any(|s| *s == "..") {
            degradations.push(Degradation::TraversalRemoved);
        }
        let mut segments: Vec<String> = raw_segments
            .into_iter()
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .map(String::from)
            .collect();

        if located {
            for base in &self.url_bases {
                if strip_leading(&mut segments, base, trailing_slash) {
                    break;
                }
            }
        }

        for prefix in &self.legacy_prefixes {
            if strip_leading(&mut segments, prefix, trailing_slash) {
                degradations.push(Degradation::LegacyPrefixStripped);
                break;
            }
        }

        let root_len = self.root_segments.len();
        let under_root = segments.len() >= root_len
            && segments[..root_len] == self.root_segments[..]
            && (segments.len() > root_len || trailing_slash);
        if !under_root {
            let mut prefixed = self.root_segments.clone();
            prefixed.append(&mut segments);
            segments = prefixed;
        }

        let mut key = segments.join("/");
        let bare_root = segments.len() <= root_len;
        if (is_folder || trailing_slash || bare_root) && !key.is_empty() {
            key.push('/');
        }

        if degradations.iter().any(|d| {
            matches!(
                d,
                Degradation::LegacyPrefixStripped | Degradation::TraversalRemoved
            )
        }) {
            tracing::debug!(
                input = %input,
                key = %key,
                degradations = ?degradations,
                "Storage key heavily rewritten during normalization"
            );
        }

        NormalizedKey { key, degradations }
    }

    /// `{root}/{owner}/{basename}` or `{root}/{basename}` when there is no owner.
    pub fn file_key(&self, owner: Option<&str>, file_name: &str) -> String {
        let base = basename(&self.normalize(file_name)).to_string();
        match owner_segment(owner) {
            Some(owner) => self.normalize(&format!("{}/{}/{}", self.root_prefix(), owner, base)),
            None => self.normalize(&format!("{}/{}", self.root_prefix(), base)),
        }
    }

    /// `{root}/{owner}/` or `{root}/`.
    pub fn folder_key(&self, owner: Option<&str>) -> String {
        match owner_segment(owner) {
            Some(owner) => self.normalize_folder(&format!("{}/{}", self.root_prefix(), owner)),
            None => self.normalize_folder(&format!("{}/", self.root_prefix())),
        }
    }

    /// Candidate keys for a client identifier, most specific first:
    ///
    /// 1. the identifier as an absolute key, when it contains `/`
    /// 2. `{root}/{owner}/{basename}` when the owner is known
    /// 3. `{root}/{basename}` (legacy flat layout)
    ///
    /// The last-resort suffix search over a listing is [`Self::suffix_matches`].
    /// Returns nothing when the identifier has no basename.
    pub fn candidate_keys_for(&self, identifier: &str, owner: Option<&str>) -> Vec<String> {
        let normalized = self.normalize(identifier);
        let base = basename(&normalized);
        if base.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<String> = Vec::with_capacity(3);
        let mut push = |key: String| {
            if !candidates.contains(&key) {
                candidates.push(key);
            }
        };

        if identifier.contains('/') || percent_decode_fully(identifier).0.contains('/') {
            push(normalized.clone());
        }
        if owner_segment(owner).is_some() {
            push(self.file_key(owner, base));
        }
        push(self.file_key(None, base));

        candidates
    }

    /// Keys under the root whose basename equals the identifier's basename,
    /// sorted for determinism.
    pub fn suffix_matches(&self, identifier: &str, listing: &[String]) -> Vec<String> {
        let normalized = self.normalize(identifier);
        let base = basename(&normalized);
        if base.is_empty() {
            return Vec::new();
        }
        let root = format!("{}/", self.root_prefix());

        let mut matches: Vec<String> = listing
            .iter()
            .filter(|key| key.starts_with(&root) && basename(key) == base)
            .cloned()
            .collect();
        matches.sort();
        matches.dedup();
        matches
    }

    /// Owner folder encoded in a key: the first segment below the root, when
    /// the key has more segments below it.
    pub fn owner_folder_of(&self, key: &str) -> Option<String> {
        let segments = segments_of(key);
        let root_len = self.root_segments.len();
        if segments.len() < root_len + 2 || segments[..root_len] != self.root_segments[..] {
            return None;
        }
        Some(segments[root_len].clone())
    }

    pub fn live_object(&self, key: &str) -> LiveObject {
        let name = basename(key);
        LiveObject {
            key: key.to_string(),
            basename: name.to_string(),
            owner_folder: self.owner_folder_of(key),
            extension: extension(name),
        }
    }
}

/// Canonical key for `input` under `root_prefix`, using the default legacy
/// prefix.
pub fn normalize(input: &str, root_prefix: &str, is_folder: bool) -> String {
    KeyNormalizer::new(root_prefix)
        .normalize_report(input, is_folder)
        .key
}

/// Last `/`-delimited segment, or the whole string when there is no `/`.
pub fn basename(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[idx + 1..],
        None => key,
    }
}

/// Basename a client reference (URL, path or bare name) points at, whatever
/// root it was stored under. Empty for folder references.
pub fn reference_basename(reference: &str) -> String {
    let key = KeyNormalizer::new("").normalize(reference);
    basename(&key).to_string()
}

/// Lowercase extension without the dot. Dotfiles have none.
pub fn extension(name: &str) -> Option<String> {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_lowercase()),
        _ => None,
    }
}

/// Folder keys and zero-byte folder markers are not files.
pub fn is_folder_placeholder(key: &str, size: u64) -> bool {
    key.ends_with('/') || (size == 0 && basename(key) == FOLDER_MARKER)
}

/// Drop `prefix` from the front of `segments` when something is left after
/// it (a trailing slash counts as a folder below the prefix).
fn strip_leading(segments: &mut Vec<String>, prefix: &[String], trailing_slash: bool) -> bool {
    let has_more =
        segments.len() > prefix.len() || (segments.len() == prefix.len() && trailing_slash);
    if has_more && segments.starts_with(prefix) {
        segments.drain(..prefix.len());
        true
    } else {
        false
    }
}

fn segments_of(value: &str) -> Vec<String> {
    value
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn owner_segment(owner: Option<&str>) -> Option<String> {
    owner
        .map(|o| segments_of(o).join("/"))
        .filter(|o| !o.is_empty() && o != "." && o != "..")
}

/// Decode until nothing decodes any more, so a second normalization cannot
/// decode further. Returns false when an escape was left in place because it
/// does not decode to UTF-8.
fn percent_decode_fully(value: &str) -> (String, bool) {
    let mut current = value.to_string();
    loop {
        match urlencoding::decode(&current) {
            Ok(decoded) if decoded == current => return (current, true),
            Ok(decoded) => current = decoded.into_owned(),
            Err(_) => return (current, false),
        }
    }
}
