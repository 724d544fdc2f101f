//! Utility functions shared across modules.
//!
//! - **Identity**: deterministic feed identifiers derived from feed URLs
//!
//! # Examples
//!
//! ```
//! use audiofeed::util::identify;
//!
//! let a = identify("https://example.com/feed.xml");
//! let b = identify("https://example.com/feed.xml");
//! assert_eq!(a, b);
//! ```

mod identity;

pub use identity::{identify, FeedId};
