use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Canonical Fields
// ============================================================================

/// A field of [`AudioObject`] that can be filled through a mapping.
///
/// `contentUrl` and `encodingFormat` are not mappable: they always come
/// from the entry's first enclosure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalField {
    Headline,
    Identifier,
    Url,
    Abstract,
    Description,
    Creator,
    DatePublished,
    Publisher,
    Genre,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 9] = [
        CanonicalField::Headline,
        CanonicalField::Identifier,
        CanonicalField::Url,
        CanonicalField::Abstract,
        CanonicalField::Description,
        CanonicalField::Creator,
        CanonicalField::DatePublished,
        CanonicalField::Publisher,
        CanonicalField::Genre,
    ];

    /// Wire name of the field, as used in mappings and index documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Headline => "headline",
            CanonicalField::Identifier => "identifier",
            CanonicalField::Url => "url",
            CanonicalField::Abstract => "abstract",
            CanonicalField::Description => "description",
            CanonicalField::Creator => "creator",
            CanonicalField::DatePublished => "datePublished",
            CanonicalField::Publisher => "publisher",
            CanonicalField::Genre => "genre",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no canonical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField(pub String);

impl FromStr for CanonicalField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CanonicalField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

// ============================================================================
// AudioObject
// ============================================================================

/// Canonical record produced from one feed entry.
///
/// This is the document written to the search index and the subject of one
/// downstream processing job. Unset fields are omitted from the JSON form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_published: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
}

impl AudioObject {
    fn slot(&mut self, field: CanonicalField) -> &mut Option<String> {
        match field {
            CanonicalField::Headline => &mut self.headline,
            CanonicalField::Identifier => &mut self.identifier,
            CanonicalField::Url => &mut self.url,
            CanonicalField::Abstract => &mut self.abstract_,
            CanonicalField::Description => &mut self.description,
            CanonicalField::Creator => &mut self.creator,
            CanonicalField::DatePublished => &mut self.date_published,
            CanonicalField::Publisher => &mut self.publisher,
            CanonicalField::Genre => &mut self.genre,
        }
    }

    /// Set a canonical field. `None` leaves it unset.
    pub fn set(&mut self, field: CanonicalField, value: Option<String>) {
        *self.slot(field) = value;
    }

    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        match field {
            CanonicalField::Headline => self.headline.as_deref(),
            CanonicalField::Identifier => self.identifier.as_deref(),
            CanonicalField::Url => self.url.as_deref(),
            CanonicalField::Abstract => self.abstract_.as_deref(),
            CanonicalField::Description => self.description.as_deref(),
            CanonicalField::Creator => self.creator.as_deref(),
            CanonicalField::DatePublished => self.date_published.as_deref(),
            CanonicalField::Publisher => self.publisher.as_deref(),
            CanonicalField::Genre => self.genre.as_deref(),
        }
    }
}
