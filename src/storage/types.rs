use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feed::Mapping;
use crate::util::{identify, FeedId};

// ============================================================================
// Error Types
// ============================================================================

/// Store-level errors: the store could not be opened, read or written.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process holds a lock on the database
    #[error("Feed store is locked by another process")]
    InstanceLocked,

    /// Migration failed
    #[error("Feed store migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Feed store error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return StoreError::InstanceLocked;
        }
        StoreError::Other(err)
    }
}

pub(crate) fn is_lock_message(message: &str) -> bool {
    // SQLITE_BUSY (5), SQLITE_LOCKED (6)
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
}

/// A stored payload that does not describe a valid feed.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Stored feed {id} is not a valid record: {source}")]
    Json {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Stored feed {id} belongs to {url}, whose id is {expected}")]
    IdMismatch {
        id: String,
        url: String,
        expected: FeedId,
    },
}

// ============================================================================
// Persisted Records
// ============================================================================

/// Record kind under which feeds are stored.
pub const FEED_KIND: &str = "Feed";

/// The persisted part of a feed.
///
/// Fetched entries are transient and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRecord {
    pub url: String,
    pub id: FeedId,
    #[serde(default)]
    pub mapping: Option<Mapping>,
}

impl FeedRecord {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode the payload stored under `key`.
    ///
    /// The stored id must equal the id derived from the stored URL and the
    /// key it was read from.
    pub fn decode(key: &str, payload: &str) -> Result<Self, DecodeError> {
        let record: FeedRecord =
            serde_json::from_str(payload).map_err(|source| DecodeError::Json {
                id: key.to_string(),
                source,
            })?;

        let expected = identify(&record.url);
        if record.id != expected || key != expected.to_string() {
            return Err(DecodeError::IdMismatch {
                id: key.to_string(),
                url: record.url,
                expected,
            });
        }
        Ok(record)
    }
}
