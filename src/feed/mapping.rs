use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use thiserror::Error;

use super::record::CanonicalField;

/// Validation errors for a supplied field mapping.
///
/// Only the shape is checked: canonical names must be known and every
/// source must be a non-empty string. Whether the source fields actually
/// occur in a feed is not validated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("Mapping must be an object of field names, got {0}")]
    NotAnObject(&'static str),

    #[error("Unknown canonical field '{0}' in mapping")]
    UnknownField(String),

    #[error("Source for canonical field '{0}' must be a string")]
    NonStringSource(String),

    #[error("Source for canonical field '{0}' is empty")]
    EmptySource(String),
}

/// Translation table from canonical field to the feed's native entry field.
///
/// A mapping does not need to cover every canonical field; unmapped fields
/// stay unset on the produced records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub struct Mapping {
    fields: BTreeMap<CanonicalField, String>,
}

impl Mapping {
    /// A mapping without any field.
    pub fn empty() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Build a mapping from `(canonical, source)` name pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut fields = BTreeMap::new();
        for (canonical, source) in pairs {
            let canonical = canonical.as_ref();
            let field: CanonicalField = canonical
                .parse()
                .map_err(|_| MappingError::UnknownField(canonical.to_string()))?;
            let source = source.into();
            if source.trim().is_empty() {
                return Err(MappingError::EmptySource(canonical.to_string()));
            }
            fields.insert(field, source);
        }
        Ok(Self { fields })
    }

    pub fn source(&self, field: CanonicalField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalField, &str)> {
        self.fields.iter().map(|(field, source)| (*field, source.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Default for Mapping {
    /// The mapping applied to feeds without an override.
    fn default() -> Self {
        let fields = BTreeMap::from([
            (CanonicalField::Headline, "title".to_string()),
            (CanonicalField::Identifier, "id".to_string()),
            (CanonicalField::Url, "link".to_string()),
            (CanonicalField::Abstract, "subtitle".to_string()),
            (CanonicalField::Description, "summary".to_string()),
            (CanonicalField::Creator, "author".to_string()),
            (CanonicalField::DatePublished, "published".to_string()),
            (CanonicalField::Publisher, "frn_radio".to_string()),
            (CanonicalField::Genre, "frn_art".to_string()),
        ]);
        Self { fields }
    }
}

impl TryFrom<BTreeMap<String, String>> for Mapping {
    type Error = MappingError;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        Self::from_pairs(map)
    }
}

impl From<Mapping> for BTreeMap<String, String> {
    fn from(mapping: Mapping) -> Self {
        mapping
            .fields
            .into_iter()
            .map(|(field, source)| (field.as_str().to_string(), source))
            .collect()
    }
}

impl TryFrom<serde_json::Value> for Mapping {
    type Error = MappingError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let object = match value {
            serde_json::Value::Object(object) => object,
            serde_json::Value::Null => return Err(MappingError::NotAnObject("null")),
            serde_json::Value::Bool(_) => return Err(MappingError::NotAnObject("a boolean")),
            serde_json::Value::Number(_) => return Err(MappingError::NotAnObject("a number")),
            serde_json::Value::String(_) => return Err(MappingError::NotAnObject("a string")),
            serde_json::Value::Array(_) => return Err(MappingError::NotAnObject("an array")),
        };

        let mut pairs = Vec::with_capacity(object.len());
        for (canonical, source) in object {
            match source {
                serde_json::Value::String(source) => pairs.push((canonical, source)),
                _ => return Err(MappingError::NonStringSource(canonical)),
            }
        }
        Self::from_pairs(pairs)
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Per-URL mapping overrides with fallback to [`Mapping::default`].
///
/// Clones share the same table. Readers never block each other; `set`
/// takes the write lock for the duration of a single insert.
#[derive(Debug, Clone, Default)]
pub struct MappingResolver {
    overrides: Arc<RwLock<HashMap<String, Mapping>>>,
}

impl MappingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver pre-populated with overrides (e.g. from configuration).
    pub fn with_overrides(overrides: HashMap<String, Mapping>) -> Self {
        Self {
            overrides: Arc::new(RwLock::new(overrides)),
        }
    }

    /// The override registered for `url`, or the default mapping.
    pub fn resolve(&self, url: &str) -> Mapping {
        let overrides = self.overrides.read().unwrap_or_else(|e| e.into_inner());
        overrides.get(url).cloned().unwrap_or_default()
    }

    /// Whether an override exists for `url`.
    pub fn has_override(&self, url: &str) -> bool {
        let overrides = self.overrides.read().unwrap_or_else(|e| e.into_inner());
        overrides.contains_key(url)
    }

    /// Replace the override for `url`.
    pub fn set(&self, url: &str, mapping: Mapping) {
        let mut overrides = self.overrides.write().unwrap_or_else(|e| e.into_inner());
        overrides.insert(url.to_string(), mapping);
    }
}
