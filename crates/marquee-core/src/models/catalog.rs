//! Catalog models: what the persisted catalog remembers about a file and what a
//! live storage listing reports.

use serde::{Deserialize, Deserializer, Serialize};

fn default_uses() -> i64 {
    1
}

fn default_active() -> bool {
    true
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// Older clients stored the owner folder as a bare number (`"subFolder": 7`).
fn deserialize_owner_folder<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// One file as known to the persisted catalog.
///
/// `url` may be stale: storage wins for `url`, `owner_folder` and `deletable` on
/// every reconciliation, while `uses` and `active` only live here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Basename of the file. Absent on legacy entries that only recorded a URL.
    #[serde(default, alias = "name", skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, alias = "filePath", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// `None` means the shared (flat) layout.
    #[serde(
        default,
        alias = "subFolder",
        deserialize_with = "deserialize_owner_folder"
    )]
    pub owner_folder: Option<String>,
    #[serde(default)]
    pub deletable: bool,
    #[serde(default = "default_uses", alias = "times")]
    pub uses: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Consecutive reconciliation passes in which storage did not have the file.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub missing_passes: u32,
}

impl CatalogEntry {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            url: None,
            owner_folder: None,
            deletable: false,
            uses: default_uses(),
            active: default_active(),
            missing_passes: 0,
        }
    }

    pub fn with_owner_folder(mut self, owner_folder: impl Into<String>) -> Self {
        self.owner_folder = Some(owner_folder.into());
        self.deletable = true;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_uses(mut self, uses: i64) -> Self {
        self.uses = uses;
        self
    }

    /// Entry for a file storage has but the catalog never saw.
    pub fn discovered(object: &LiveObject, url: String) -> Self {
        Self {
            file_name: Some(object.basename.clone()),
            url: Some(url),
            owner_folder: object.owner_folder.clone(),
            deletable: object.owner_folder.is_some(),
            uses: default_uses(),
            active: default_active(),
            missing_passes: 0,
        }
    }
}

/// One object returned by a storage listing. Recomputed on every listing and
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveObject {
    pub key: String,
    pub basename: String,
    pub owner_folder: Option<String>,
    pub extension: Option<String>,
}
