//! Concurrent RSS/Atom feed loading.
//!
//! Give [`feed::FeedLoader`] a list of loosely specified sources
//! (`example.com`, `https://example.com/blog/`) and it finds a working feed
//! endpoint for each, parses them concurrently under a single deadline and
//! returns one merged, newest-first list of items.

pub mod config;
pub mod feed;
