mod feeds;
mod posts;
mod schema;
mod types;

pub use schema::Database;
pub use types::{Feed, Post, StorageError};
