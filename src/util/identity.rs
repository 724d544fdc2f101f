use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier of a registered feed.
///
/// Derived exclusively from the feed URL as a name-based (version 3) UUID in
/// the URL namespace, so the same URL maps to the same id in every process.
/// The hyphenated string form is the key under which the feed is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(Uuid);

impl FeedId {
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for FeedId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Derive the identifier of a feed URL.
///
/// The URL is hashed exactly as given: no normalisation of case, trailing
/// slashes or query order is applied.
pub fn identify(url: &str) -> FeedId {
    FeedId(Uuid::new_v3(&Uuid::NAMESPACE_URL, url.as_bytes()))
}
