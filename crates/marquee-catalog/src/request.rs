//! Delete request input, built once at the boundary.
//!
//! Clients name the file in the body, the query string or headers, using any
//! of `key`, `filePath`, `name` or `file_name`. The first source that carries
//! an identifier wins (body, then query, then headers); inside a source the
//! fields are tried in that order.

use serde::{Deserialize, Deserializer};

use crate::error::{CatalogError, CatalogResult};

pub const HEADER_KEY: &str = "x-file-key";
pub const HEADER_FILE_PATH: &str = "x-file-path";
pub const HEADER_NAME: &str = "x-file-name";
pub const HEADER_SUB_FOLDER: &str = "x-sub-folder";

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Identifier fields as one source (body, query or headers) supplies them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RequestFields {
    #[serde(default, deserialize_with = "optional_text")]
    pub key: Option<String>,
    #[serde(default, rename = "filePath", deserialize_with = "optional_text")]
    pub file_path: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub file_name: Option<String>,
    #[serde(
        default,
        rename = "subFolder",
        alias = "ownerFolder",
        deserialize_with = "optional_text"
    )]
    pub sub_folder: Option<String>,
}

impl RequestFields {
    /// Collect fields from header pairs. Header names are case-insensitive.
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut fields = Self::default();
        for (name, value) in headers {
            let slot = match name.to_ascii_lowercase().as_str() {
                HEADER_KEY => &mut fields.key,
                HEADER_FILE_PATH => &mut fields.file_path,
                HEADER_NAME => &mut fields.name,
                HEADER_SUB_FOLDER => &mut fields.sub_folder,
                _ => continue,
            };
            *slot = Some(value.to_string());
        }
        fields
    }

    fn identifier(&self) -> Option<&str> {
        non_blank(&self.key)
            .or_else(|| non_blank(&self.file_path))
            .or_else(|| non_blank(&self.name))
            .or_else(|| non_blank(&self.file_name))
    }

    fn owner(&self) -> Option<&str> {
        non_blank(&self.sub_folder)
    }
}

/// What the deletion core needs: one identifier and an optional owner hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub identifier: String,
    pub owner: Option<String>,
}

impl DeleteRequest {
    pub fn new(identifier: impl Into<String>, owner: Option<String>) -> CatalogResult<Self> {
        let identifier = identifier.into().trim().to_string();
        if identifier.is_empty() {
            return Err(CatalogError::MissingIdentifier);
        }
        Ok(Self {
            identifier,
            owner: owner
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty()),
        })
    }

    /// Resolve from sources in precedence order: body, query, headers.
    pub fn from_sources(
        body: Option<&RequestFields>,
        query: Option<&RequestFields>,
        headers: Option<&RequestFields>,
    ) -> CatalogResult<Self> {
        let sources: Vec<&RequestFields> = [body, query, headers].into_iter().flatten().collect();

        let identifier = sources
            .iter()
            .find_map(|s| s.identifier())
            .ok_or(CatalogError::MissingIdentifier)?;
        let owner = sources.iter().find_map(|s| s.owner()).map(String::from);

        Self::new(identifier, owner)
    }

    /// An authenticated owner overrides whatever the client claimed.
    pub fn with_owner(mut self, owner: Option<String>) -> Self {
        if let Some(owner) = owner.map(|o| o.trim().to_string()).filter(|o| !o.is_empty()) {
            self.owner = Some(owner);
        }
        self
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }
}
