use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

use super::entity::{Feed, MAX_FEED_SIZE};
use super::mapping::{Mapping, MappingError, MappingResolver};
use crate::storage::{DecodeError, FeedRecord, FeedStore, StoreConnector, StoreError, FEED_KIND};
use crate::util::identify;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Invalid mapping: {0}")]
    Validation(#[from] MappingError),

    #[error("Failed to encode feed record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Registry of feeds, keyed by the id derived from their URL.
///
/// The store is opened on first use and shared afterwards; concurrent first
/// callers wait for a single open. If opening fails the next call tries
/// again.
pub struct FeedManager {
    connector: Arc<dyn StoreConnector>,
    store: OnceCell<Arc<dyn FeedStore>>,
    resolver: MappingResolver,
    max_feed_bytes: usize,
}

impl FeedManager {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self::with_resolver(connector, MappingResolver::new())
    }

    pub fn with_resolver(connector: Arc<dyn StoreConnector>, resolver: MappingResolver) -> Self {
        Self {
            connector,
            store: OnceCell::new(),
            resolver,
            max_feed_bytes: MAX_FEED_SIZE,
        }
    }

    /// Body size limit applied to the feeds this registry hands out.
    pub fn with_max_feed_bytes(mut self, max_feed_bytes: usize) -> Self {
        self.max_feed_bytes = max_feed_bytes;
        self
    }

    pub fn resolver(&self) -> &MappingResolver {
        &self.resolver
    }

    /// Open the store unless it is already open.
    pub async fn ensure_open(&self) -> Result<&Arc<dyn FeedStore>, StoreError> {
        self.store
            .get_or_try_init(|| async {
                tracing::debug!("Opening feed store");
                self.connector.open().await
            })
            .await
    }

    /// Register `url`, creating the feed record if it does not exist yet.
    ///
    /// Returns the stored feed when one exists; its stored mapping wins over
    /// any override registered since.
    pub async fn put(&self, url: &str) -> Result<Feed, RegistryError> {
        let store = self.ensure_open().await?;
        let id = identify(url);
        let key = id.to_string();

        if let Some(payload) = store.get(&key).await? {
            tracing::debug!(feed_id = %id, url = %url, "Feed already registered");
            return Ok(self.decorate(Feed::from_record(FeedRecord::decode(&key, &payload)?)));
        }

        let mapping = self.resolver.resolve(url);
        let feed = Feed::new(url, Some(mapping));
        store.put(FEED_KIND, &key, &feed.to_record().encode()?).await?;
        tracing::info!(feed_id = %id, url = %url, "Registered feed");
        Ok(self.decorate(feed))
    }

    /// The registered feed for `url`, if any. Never writes.
    pub async fn get(&self, url: &str) -> Result<Option<Feed>, RegistryError> {
        let store = self.ensure_open().await?;
        let key = identify(url).to_string();

        match store.get(&key).await? {
            Some(payload) => {
                let record = FeedRecord::decode(&key, &payload)?;
                Ok(Some(self.decorate(Feed::from_record(record))))
            }
            None => Ok(None),
        }
    }

    /// Override the mapping for `url`.
    ///
    /// The override is kept in the resolver before the store is touched, and
    /// written to the stored feed record if one exists. Without a record the
    /// override is used when the feed is registered later.
    pub async fn set_mapping(&self, url: &str, mapping: Mapping) -> Result<(), RegistryError> {
        self.resolver.set(url, mapping.clone());
        let store = self.ensure_open().await?;

        let id = identify(url);
        let key = id.to_string();
        let Some(payload) = store.get(&key).await? else {
            tracing::debug!(feed_id = %id, url = %url, "Mapping kept until feed is registered");
            return Ok(());
        };

        let mut record = FeedRecord::decode(&key, &payload)?;
        record.mapping = Some(mapping);
        store
            .put(FEED_KIND, &key, &record.encode()?)
            .await
            .inspect_err(|e| {
                tracing::warn!(feed_id = %id, error = %e, "Writing mapping to stored feed failed");
            })?;
        tracing::debug!(feed_id = %id, url = %url, "Updated stored feed mapping");
        Ok(())
    }

    /// Validate an untyped mapping and apply it like [`set_mapping`](Self::set_mapping).
    pub async fn set_mapping_json(
        &self,
        url: &str,
        mapping: serde_json::Value,
    ) -> Result<(), RegistryError> {
        let mapping = Mapping::try_from(mapping)?;
        self.set_mapping(url, mapping).await
    }

    fn decorate(&self, feed: Feed) -> Feed {
        feed.with_max_feed_bytes(self.max_feed_bytes)
    }
}
