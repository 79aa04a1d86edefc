use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Storage-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum StorageError {
    /// Another instance of the application has locked the database
    #[error("Another instance of gather appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// The referenced feed no longer exists
    #[error("Feed not found: {0}")]
    FeedNotFound(Uuid),

    /// A row with this unique URL already exists
    #[error("URL already stored: {0}")]
    DuplicateUrl(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StorageError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StorageError::InstanceLocked;
        }

        StorageError::Other(err)
    }

    /// Map a migration failure, preserving lock detection so a concurrent
    /// instance is reported as [`StorageError::InstanceLocked`] rather than
    /// a generic migration error
    pub(crate) fn from_migration(err: sqlx::Error) -> Self {
        match Self::from_sqlx(err) {
            StorageError::InstanceLocked => StorageError::InstanceLocked,
            StorageError::Other(e) => StorageError::Migration(e.to_string()),
            other => other,
        }
    }

    /// Map an insert failure, turning a unique-constraint violation on `url`
    /// into [`StorageError::DuplicateUrl`]
    pub(crate) fn from_insert(err: sqlx::Error, url: &str) -> Self {
        match err.as_database_error() {
            Some(db) if db.is_unique_violation() => StorageError::DuplicateUrl(url.to_owned()),
            _ => StorageError::from_sqlx(err),
        }
    }
}

// ============================================================================
// Row Types
// ============================================================================

/// Timestamps are stored as Unix seconds; out-of-range values clamp to epoch.
fn datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Internal row type for feed queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedRow {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_fetched_at: Option<i64>,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            id: row.id,
            name: row.name,
            url: row.url,
            created_at: datetime(row.created_at),
            updated_at: datetime(row.updated_at),
            last_fetched_at: row.last_fetched_at.map(datetime),
        }
    }
}

/// Internal row type for post queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            feed_id: row.feed_id,
            title: row.title,
            url: row.url,
            description: row.description,
            published_at: datetime(row.published_at),
            created_at: datetime(row.created_at),
            updated_at: datetime(row.updated_at),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed syndication source.
///
/// `last_fetched_at` drives fetch priority: feeds with the oldest (or no)
/// timestamp are selected first, and the fetcher stamps it before any
/// network I/O so a broken feed rotates to the back of the queue instead
/// of being retried every cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// A single article ingested from a feed.
///
/// `url` is unique across all posts and serves as the dedup key; inserting
/// the same URL twice is a no-op for the ingestion pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Tests
// ============================================================================
