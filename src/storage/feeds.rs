use chrono::Utc;
use uuid::Uuid;

use super::schema::Database;
use super::types::{Feed, FeedRow, StorageError};

impl Database {
    // ========================================================================
    // Subscription Operations
    // ========================================================================

    /// Subscribe to a feed. The URL is unique across all feeds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DuplicateUrl` if a feed with this URL already
    /// exists.
    pub async fn create_feed(&self, name: &str, url: &str) -> Result<Feed, StorageError> {
        let now = Utc::now().timestamp();
        let row: FeedRow = sqlx::query_as(
            "INSERT INTO feeds (id, name, url, created_at, updated_at, last_fetched_at)
             VALUES (?, ?, ?, ?, ?, NULL)
             RETURNING id, name, url, created_at, updated_at, last_fetched_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(url)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::from_insert(e, url))?;

        Ok(row.into())
    }

    /// All subscribed feeds, ordered by name for display.
    pub async fn list_feeds(&self) -> Result<Vec<Feed>, StorageError> {
        let rows: Vec<FeedRow> = sqlx::query_as(
            "SELECT id, name, url, created_at, updated_at, last_fetched_at
             FROM feeds
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    // ========================================================================
    // Collection Operations
    // ========================================================================

    /// Select up to `limit` feeds due for collection, stalest first.
    ///
    /// Feeds that have never been fetched (`last_fetched_at` NULL) come
    /// before everything else; among fetched feeds the oldest timestamp
    /// wins. The id tiebreak keeps the order deterministic.
    pub async fn select_due_feeds(&self, limit: u32) -> Result<Vec<Feed>, StorageError> {
        let rows: Vec<FeedRow> = sqlx::query_as(
            "SELECT id, name, url, created_at, updated_at, last_fetched_at
             FROM feeds
             ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// Stamp a feed as fetched now and return the updated record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::FeedNotFound` if the feed no longer exists.
    pub async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<Feed, StorageError> {
        let now = Utc::now().timestamp();
        let row: Option<FeedRow> = sqlx::query_as(
            "UPDATE feeds SET last_fetched_at = ?, updated_at = ? WHERE id = ?
             RETURNING id, name, url, created_at, updated_at, last_fetched_at",
        )
        .bind(now)
        .bind(now)
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Feed::from)
            .ok_or(StorageError::FeedNotFound(feed_id))
    }
}

// ============================================================================
// Tests
// ============================================================================
