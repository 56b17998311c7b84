//! Concurrent RSS/Atom loading.
//!
//! - **Resolving**: Normalize user input into a base URL, domain and name
//! - **Parsing**: Stream RSS 2.0 / Atom 1.0 XML into items, with caps and filters
//! - **Fetching**: Try a fixed list of endpoint suffixes per source until one parses
//! - **Loading**: Fan out one task per source under a global deadline and merge
//!
//! # Architecture
//!
//! - [`source`] - `FeedSource` and the resolver
//! - [`parser`] - Streaming `quick-xml` state machine
//! - [`date`] - Lenient RSS/Atom date parsing
//! - [`transport`] - The `FeedTransport` seam and its `reqwest` implementation
//! - [`fetcher`] - Per-source endpoint fallback
//! - [`loader`] - Coordinator and finalizer
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use feedloader::feed::{load_feeds, HttpTransport, LoadOptions};
//!
//! # async fn run() {
//! let result = load_feeds(
//!     Arc::new(HttpTransport::default()),
//!     ["blog.rust-lang.org", "https://this-week-in-rust.org"],
//!     LoadOptions::default().with_max_items(20),
//! )
//! .await;
//!
//! for item in &result.items {
//!     println!("{} - {}", item.source.display_name, item.title);
//! }
//! # }
//! ```

pub mod date;
pub mod fetcher;
pub mod item;
pub mod loader;
pub mod parser;
pub mod source;
pub mod transport;

pub use date::{parse_atom_date, parse_rss_date};
pub use fetcher::{fetch_source, FetchError, FetchResult, ENDPOINT_SUFFIXES};
pub use item::{accept_all, max_age_filter, FeedItem, ItemFilter};
pub use loader::{finalize, load_feeds, AggregateResult, FeedLoader, LoadOptions, DEFAULT_TIMEOUT};
pub use parser::{parse_feed, ParseError, ParsedFeed};
pub use source::{resolve_source, FeedSource, ResolvedSource};
pub use transport::{FeedBody, FeedTransport, HttpTransport};
