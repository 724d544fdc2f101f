use async_trait::async_trait;
use std::sync::Arc;

use super::schema::Database;
use super::types::StoreError;

/// Key/value persistence for serialized records.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// The payload stored under `id`, if any.
    async fn get(&self, id: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` of kind `kind` under `id`, replacing any previous value.
    async fn put(&self, kind: &str, id: &str, value: &str) -> Result<(), StoreError>;
}

/// Opens a [`FeedStore`]. Called at most once per successful open by
/// [`FeedManager`](crate::feed::FeedManager).
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn FeedStore>, StoreError>;
}

/// Connects to the SQLite [`Database`] at `path`.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: String,
}

impl SqliteConnector {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// A connector for a private in-memory database.
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }
}

#[async_trait]
impl StoreConnector for SqliteConnector {
    async fn open(&self) -> Result<Arc<dyn FeedStore>, StoreError> {
        let db = Database::open(&self.path).await?;
        Ok(Arc::new(db))
    }
}
