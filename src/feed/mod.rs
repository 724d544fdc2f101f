//! Feed registration, fetching and transformation.
//!
//! This module turns third-party RSS/Atom feeds into canonical
//! [`AudioObject`] records and hands each record to the downstream services:
//!
//! - **Registry**: [`FeedManager`] stores feeds keyed by the id derived from their URL
//! - **Mapping**: [`Mapping`] and [`MappingResolver`] translate native entry fields to canonical ones
//! - **Fetching**: single-GET retrieval with classified failures
//! - **Transform + dispatch**: [`Feed::transform`] and [`Feed::index_and_create_tasks`]
//!
//! # Architecture
//!
//! - [`parser`] - feed parsing with `feed-rs`, plus namespaced extension fields
//! - [`fetcher`] - HTTP fetching with a body size limit
//! - [`mapping`] - field mappings and per-URL overrides
//! - [`record`] - the canonical record type
//! - [`entity`] - the [`Feed`] lifecycle
//! - [`manager`] - the [`FeedManager`] registry
//!
//! # Example
//!
//! ```ignore
//! use audiofeed::feed::{DispatchOptions, FeedManager};
//! use audiofeed::storage::SqliteConnector;
//!
//! let manager = FeedManager::new(Arc::new(SqliteConnector::new("feeds.db")));
//! let mut feed = manager.put("https://radio.example.com/podcast.xml").await?;
//! let pairs = feed
//!     .index_and_create_tasks(&client, &index, &jobs, &DispatchOptions::default())
//!     .await?;
//! ```

pub mod entity;
pub mod fetcher;
pub mod manager;
pub mod mapping;
pub mod parser;
pub mod record;

pub use entity::{DispatchOptions, Feed, FeedError, MAX_FEED_SIZE};
pub use fetcher::{build_client, FetchError};
pub use manager::{FeedManager, RegistryError};
pub use mapping::{Mapping, MappingError, MappingResolver};
pub use parser::{Enclosure, RawEntry};
pub use record::{AudioObject, CanonicalField};
