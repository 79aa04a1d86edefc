//! Feed collection: RSS/Atom decoding plus HTTP ingestion.
//!
//! The module is organized into two submodules:
//!
//! - [`parser`] - document decoding and per-item date parsing
//! - [`fetcher`] - HTTP retrieval and post storage for one feed
//!
//! The scheduler drives [`Fetcher::ingest`] once per due feed per cycle.

mod fetcher;
mod parser;

pub use fetcher::{FetchError, Fetcher, IngestSummary};
pub use parser::{parse_feed, parse_item_date, FeedItem, FeedKind, ParseError, ParsedFeed};
