use crate::feed::parser::{parse_feed, parse_item_date, ParseError, ParsedFeed};
use crate::storage::{Database, Feed, Post, StorageError};
use chrono::Utc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while collecting one feed.
///
/// None of these are fatal to the collection loop: the scheduler logs the
/// failure and the feed is retried on a later cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request exceeded the configured timeout
    #[error("request timed out")]
    Timeout,
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with a non-2xx status code
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),
    /// Body could not be decoded as RSS or Atom
    #[error("feed did not parse: {0}")]
    Parse(#[from] ParseError),
    /// Marking the feed or storing a post failed
    #[error("storage operation failed: {0}")]
    Storage(#[from] StorageError),
}

/// Outcome of one successful collection pass over a feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Items present in the document, including ones that were skipped
    pub items_found: usize,
    /// Posts actually inserted (duplicates and bad dates excluded)
    pub posts_created: usize,
}

/// Fetches feed documents and stores their items as posts.
///
/// Cheap to clone: the HTTP client and database handle are both
/// internally reference-counted, so the scheduler hands one clone
/// to each collection task.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    db: Database,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(db: Database, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("gather/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            db,
            timeout,
        })
    }

    /// Collect one feed: mark it fetched, download and parse its document,
    /// and store each item as a post.
    ///
    /// The feed is marked fetched before any network I/O so that a feed
    /// whose server hangs or errors still rotates to the back of the due
    /// queue instead of being retried every cycle.
    ///
    /// Item-level problems (unparseable date, duplicate URL, failed write)
    /// skip that item only; the rest of the document still lands.
    pub async fn ingest(&self, feed: Feed) -> Result<IngestSummary, FetchError> {
        let feed = self.db.mark_feed_fetched(feed.id).await?;

        let response = tokio::time::timeout(self.timeout, self.client.get(&feed.url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let body = tokio::time::timeout(self.timeout, response.text())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        let parsed = parse_feed(&body)?;
        let summary = self.ingest_items(&feed, parsed).await;

        tracing::info!(
            feed = %feed.name,
            items = summary.items_found,
            created = summary.posts_created,
            "feed collected"
        );

        Ok(summary)
    }

    async fn ingest_items(&self, feed: &Feed, parsed: ParsedFeed) -> IngestSummary {
        let kind = parsed.kind;
        let mut summary = IngestSummary {
            items_found: parsed.items.len(),
            ..Default::default()
        };

        for item in parsed.items {
            let published_at = match parse_item_date(kind, &item.pub_date) {
                Ok(instant) => instant,
                Err(e) => {
                    tracing::warn!(
                        feed = %feed.name,
                        title = %item.title,
                        error = %e,
                        "skipping item with unparseable date"
                    );
                    continue;
                }
            };

            let now = Utc::now();
            let post = Post {
                id: Uuid::new_v4(),
                feed_id: feed.id,
                title: item.title,
                url: item.link,
                description: item.description,
                published_at,
                created_at: now,
                updated_at: now,
            };

            match self.db.insert_post(&post).await {
                Ok(_) => summary.posts_created += 1,
                Err(StorageError::DuplicateUrl(url)) => {
                    tracing::debug!(feed = %feed.name, url = %url, "post already stored");
                }
                Err(e) => {
                    tracing::error!(
                        feed = %feed.name,
                        url = %post.url,
                        error = %e,
                        "failed to store post"
                    );
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test Feed</title>
    <item>
        <title>Hello</title>
        <link>http://x/1</link>
        <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate>
    </item>
</channel></rss>"#;

    async fn setup(url: &str) -> (Database, Feed, Fetcher) {
        let db = Database::open(":memory:").await.unwrap();
        let feed = db.create_feed("Test Feed", url).await.unwrap();
        let fetcher = Fetcher::new(db.clone(), Duration::from_secs(10)).unwrap();
        (db, feed, fetcher)
    }

    async fn mount_body(server: &MockServer, body: &str) {
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_ingest_stores_rss_items() {
        let server = MockServer::start().await;
        mount_body(&server, VALID_RSS).await;

        let (db, feed, fetcher) = setup(&format!("{}/feed", server.uri())).await;
        let summary = fetcher.ingest(feed.clone()).await.unwrap();

        assert_eq!(
            summary,
            IngestSummary {
                items_found: 1,
                posts_created: 1,
            }
        );

        let posts = db.posts_for_feed(feed.id).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Hello");
        assert_eq!(posts[0].url, "http://x/1");
        assert_eq!(
            posts[0].published_at,
            DateTime::parse_from_rfc3339("2006-01-02T22:04:05Z").unwrap()
        );
    }

    #[tokio::test]
    async fn test_ingest_is_idempotent() {
        let server = MockServer::start().await;
        mount_body(&server, VALID_RSS).await;

        let (db, feed, fetcher) = setup(&format!("{}/feed", server.uri())).await;

        fetcher.ingest(feed.clone()).await.unwrap();
        let second = fetcher.ingest(feed.clone()).await.unwrap();

        assert_eq!(second.items_found, 1);
        assert_eq!(second.posts_created, 0);
        assert_eq!(db.posts_for_feed(feed.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_skips_items_with_bad_dates() {
        let body = r#"<rss version="2.0"><channel><title>Mixed</title>
            <item><title>A</title><link>http://x/a</link><pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate></item>
            <item><title>B</title><link>http://x/b</link><pubDate>not a date</pubDate></item>
            <item><title>C</title><link>http://x/c</link><pubDate>Tue, 03 Jan 2006 15:04:05 -0700</pubDate></item>
            <item><title>D</title><link>http://x/d</link><pubDate>Wed, 04 Jan 2006 15:04:05 -0700</pubDate></item>
            <item><title>E</title><link>http://x/e</link><pubDate>Thu, 05 Jan 2006 15:04:05 -0700</pubDate></item>
        </channel></rss>"#;

        let server = MockServer::start().await;
        mount_body(&server, body).await;

        let (db, feed, fetcher) = setup(&format!("{}/feed", server.uri())).await;
        let summary = fetcher.ingest(feed.clone()).await.unwrap();

        assert_eq!(summary.items_found, 5);
        assert_eq!(summary.posts_created, 4);

        let posts = db.posts_for_feed(feed.id).await.unwrap();
        assert!(posts.iter().all(|p| p.title != "B"));
    }

    #[tokio::test]
    async fn test_ingest_stores_atom_entries() {
        let body = r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <title>Atom Feed</title>
            <entry>
                <title>One</title>
                <link href="http://x/atom/1"/>
                <summary>First entry</summary>
                <published>2006-01-02T15:04:05Z</published>
            </entry>
            <entry>
                <title>Two</title>
                <link href="http://x/atom/2"/>
                <updated>2006-01-03T15:04:05Z</updated>
            </entry>
        </feed>"#;

        let server = MockServer::start().await;
        mount_body(&server, body).await;

        let (db, feed, fetcher) = setup(&format!("{}/feed", server.uri())).await;
        let summary = fetcher.ingest(feed.clone()).await.unwrap();

        assert_eq!(summary.posts_created, 2);

        let posts = db.posts_for_feed(feed.id).await.unwrap();
        let one = posts.iter().find(|p| p.title == "One").unwrap();
        assert_eq!(one.url, "http://x/atom/1");
        assert_eq!(one.description, Some("First entry".to_string()));
    }

    #[tokio::test]
    async fn test_atom_entry_without_dates_stores_nothing() {
        let body = r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <title>T</title>
            <entry><title>Undated</title><link href="http://x/1"/></entry>
        </feed>"#;

        let server = MockServer::start().await;
        mount_body(&server, body).await;

        let (db, feed, fetcher) = setup(&format!("{}/feed", server.uri())).await;
        let summary = fetcher.ingest(feed.clone()).await.unwrap();

        assert_eq!(summary.items_found, 1);
        assert_eq!(summary.posts_created, 0);
        assert!(db.posts_for_feed(feed.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feed_is_marked_fetched_even_when_fetch_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (db, feed, fetcher) = setup(&format!("{}/feed", server.uri())).await;
        let err = fetcher.ingest(feed).await.unwrap_err();

        assert!(matches!(err, FetchError::HttpStatus(500)));

        let feeds = db.list_feeds().await.unwrap();
        assert!(feeds[0].last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_http_404_aborts_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (_db, feed, fetcher) = setup(&format!("{}/feed", server.uri())).await;
        let err = fetcher.ingest(feed).await.unwrap_err();

        assert!(matches!(err, FetchError::HttpStatus(404)));
    }

    #[tokio::test]
    async fn test_malformed_body_aborts_feed() {
        let server = MockServer::start().await;
        mount_body(&server, "<not valid xml").await;

        let (db, feed, fetcher) = setup(&format!("{}/feed", server.uri())).await;
        let err = fetcher.ingest(feed.clone()).await.unwrap_err();

        assert!(matches!(err, FetchError::Parse(_)));
        assert!(db.posts_for_feed(feed.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let feed = db
            .create_feed("Slow", &format!("{}/feed", server.uri()))
            .await
            .unwrap();
        let fetcher = Fetcher::new(db, Duration::from_millis(50)).unwrap();

        let err = fetcher.ingest(feed).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout));
    }

    #[tokio::test]
    async fn test_unknown_feed_aborts_before_network() {
        let db = Database::open(":memory:").await.unwrap();
        let fetcher = Fetcher::new(db, Duration::from_secs(10)).unwrap();

        let now = Utc::now();
        let ghost = Feed {
            id: Uuid::new_v4(),
            name: "Ghost".to_string(),
            url: "http://127.0.0.1:1/feed".to_string(),
            created_at: now,
            updated_at: now,
            last_fetched_at: None,
        };

        let err = fetcher.ingest(ghost).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Storage(StorageError::FeedNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_feed_is_success() {
        let body = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Empty</title></channel></rss>"#;

        let server = MockServer::start().await;
        mount_body(&server, body).await;

        let (_db, feed, fetcher) = setup(&format!("{}/feed", server.uri())).await;
        let summary = fetcher.ingest(feed).await.unwrap();

        assert_eq!(summary, IngestSummary::default());
    }
}
