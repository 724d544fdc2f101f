//! Imports RSS/Atom feeds as canonical audio records.
//!
//! A feed is registered once per URL ([`feed::FeedManager`]), pulled and
//! transformed under a field mapping ([`feed::Feed`]), and every resulting
//! [`feed::AudioObject`] is written to a search index and handed to the job
//! system as one transcription task ([`services`]).

pub mod config;
pub mod feed;
pub mod services;
pub mod storage;
pub mod util;

pub use config::Config;
pub use feed::{Feed, FeedError, FeedManager, RegistryError};
pub use util::{identify, FeedId};
