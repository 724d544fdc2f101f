mod schema;
mod store;
mod types;

pub use schema::Database;
pub use store::{FeedStore, SqliteConnector, StoreConnector};
pub use types::{DecodeError, FeedRecord, StoreError, FEED_KIND};
