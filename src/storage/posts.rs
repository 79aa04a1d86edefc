use uuid::Uuid;

use super::schema::Database;
use super::types::{Post, PostRow, StorageError};

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post and return the stored row.
    ///
    /// `url` is the dedup key: inserting a URL that already exists fails
    /// with `StorageError::DuplicateUrl`, which the ingestion pipeline
    /// treats as success-no-op.
    pub async fn insert_post(&self, post: &Post) -> Result<Post, StorageError> {
        let row: PostRow = sqlx::query_as(
            "INSERT INTO posts (id, feed_id, title, url, description, published_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id, feed_id, title, url, description, published_at, created_at, updated_at",
        )
        .bind(post.id)
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at.timestamp())
        .bind(post.created_at.timestamp())
        .bind(post.updated_at.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::from_insert(e, &post.url))?;

        Ok(row.into())
    }

    /// The `limit` newest posts across all feeds by publication time.
    ///
    /// Items from one batch often share a publication timestamp, so the id
    /// tiebreak keeps the order stable across queries.
    pub async fn recent_posts(&self, limit: u32) -> Result<Vec<Post>, StorageError> {
        let rows: Vec<PostRow> = sqlx::query_as(
            "SELECT id, feed_id, title, url, description, published_at, created_at, updated_at
             FROM posts
             ORDER BY published_at DESC, id ASC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Post::from).collect())
    }

    /// All posts belonging to one feed, newest first.
    pub async fn posts_for_feed(&self, feed_id: Uuid) -> Result<Vec<Post>, StorageError> {
        let rows: Vec<PostRow> = sqlx::query_as(
            "SELECT id, feed_id, title, url, description, published_at, created_at, updated_at
             FROM posts
             WHERE feed_id = ?
             ORDER BY published_at DESC, id ASC",
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Post::from).collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    /// Second-precision timestamps so values survive the round trip through
    /// Unix-second columns unchanged.
    fn test_post(feed_id: Uuid, url: &str, published_secs: i64) -> Post {
        let stored_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        Post {
            id: Uuid::new_v4(),
            feed_id,
            title: "Test Post".to_string(),
            url: url.to_string(),
            description: Some("Test description".to_string()),
            published_at: DateTime::from_timestamp(published_secs, 0).unwrap(),
            created_at: stored_at,
            updated_at: stored_at,
        }
    }

    #[tokio::test]
    async fn test_insert_post_returns_stored_row() {
        let db = test_db().await;
        let feed = db
            .create_feed("Example", "https://example.com/rss")
            .await
            .unwrap();

        let post = test_post(feed.id, "https://example.com/post/1", 1_600_000_000);
        let stored = db.insert_post(&post).await.unwrap();
        assert_eq!(stored, post);
    }

    #[tokio::test]
    async fn test_insert_post_duplicate_url() {
        let db = test_db().await;
        let feed = db
            .create_feed("Example", "https://example.com/rss")
            .await
            .unwrap();

        db.insert_post(&test_post(feed.id, "https://example.com/post/1", 1))
            .await
            .unwrap();
        let err = db
            .insert_post(&test_post(feed.id, "https://example.com/post/1", 2))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::DuplicateUrl(_)));
        assert_eq!(db.recent_posts(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_post_unknown_feed_rejected() {
        let db = test_db().await;

        let err = db
            .insert_post(&test_post(Uuid::new_v4(), "https://example.com/post/1", 1))
            .await
            .unwrap_err();

        // Foreign key violation, not a duplicate
        assert!(matches!(err, StorageError::Other(_)));
    }

    #[tokio::test]
    async fn test_insert_post_without_description() {
        let db = test_db().await;
        let feed = db
            .create_feed("Example", "https://example.com/rss")
            .await
            .unwrap();

        let mut post = test_post(feed.id, "https://example.com/post/1", 1);
        post.description = None;
        let stored = db.insert_post(&post).await.unwrap();
        assert_eq!(stored.description, None);
    }

    #[tokio::test]
    async fn test_recent_posts_newest_first() {
        let db = test_db().await;
        let feed = db
            .create_feed("Example", "https://example.com/rss")
            .await
            .unwrap();

        db.insert_post(&test_post(feed.id, "https://example.com/post/old", 1_000))
            .await
            .unwrap();
        db.insert_post(&test_post(feed.id, "https://example.com/post/new", 3_000))
            .await
            .unwrap();
        db.insert_post(&test_post(feed.id, "https://example.com/post/mid", 2_000))
            .await
            .unwrap();

        let posts = db.recent_posts(2).await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].url, "https://example.com/post/new");
        assert_eq!(posts[1].url, "https://example.com/post/mid");
    }

    #[tokio::test]
    async fn test_recent_posts_equal_timestamps_ordered_by_id() {
        let db = test_db().await;
        let feed = db
            .create_feed("Example", "https://example.com/rss")
            .await
            .unwrap();

        // One batch, one shared pubDate
        let mut ids = Vec::new();
        for i in 0..3 {
            let post = test_post(feed.id, &format!("https://example.com/post/{i}"), 1_000);
            ids.push(post.id);
            db.insert_post(&post).await.unwrap();
        }
        ids.sort();

        let recent: Vec<Uuid> = db
            .recent_posts(10)
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(recent, ids);

        let per_feed: Vec<Uuid> = db
            .posts_for_feed(feed.id)
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(per_feed, ids);
    }

    #[tokio::test]
    async fn test_posts_for_feed_filters_by_feed() {
        let db = test_db().await;
        let a = db.create_feed("A", "https://a.example.com/rss").await.unwrap();
        let b = db.create_feed("B", "https://b.example.com/rss").await.unwrap();

        db.insert_post(&test_post(a.id, "https://a.example.com/1", 1))
            .await
            .unwrap();
        db.insert_post(&test_post(b.id, "https://b.example.com/1", 2))
            .await
            .unwrap();

        let posts = db.posts_for_feed(a.id).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].feed_id, a.id);
    }
}
