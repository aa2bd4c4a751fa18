//! Listing discovery for Atlas.
//!
//! - [`crawler::ListingCrawler`]: paginated search with a one-time
//!   type-the-location fallback, driven through
//!   [`atlas_drivers::BrowserSession`]
//! - [`urls`]: search URL construction
//! - `testing` (behind the `test-support` feature): a scripted fake browser

pub mod crawler;
pub mod urls;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use crawler::{ListingCrawler, SearchResult};
