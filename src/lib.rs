//! gather: a continuous RSS/Atom collector.
//!
//! A scheduler wakes on a fixed interval, selects the feeds that have
//! gone longest without a fetch, and ingests each one concurrently:
//! download, decode, and store every item as a post in SQLite. Posts
//! deduplicate on URL, so re-collecting a feed is always safe.

pub mod config;
pub mod feed;
pub mod scheduler;
pub mod storage;
pub mod util;
