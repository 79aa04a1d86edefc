//! RSS 2.0 and Atom decoding into a normalized item sequence.
//!
//! Format detection inspects the document root, each variant is decoded
//! through its own serde mirror, and items carry their publication dates
//! as raw strings: date parsing happens per item at ingestion time, so a
//! bad date skips one item rather than the whole document.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not well-formed XML
    #[error("malformed document: {0}")]
    Malformed(#[from] quick_xml::Error),

    /// The document is XML but does not decode as the detected variant
    #[error("failed to decode document: {0}")]
    Decode(#[from] quick_xml::DeError),

    /// The root element is neither `<rss>` nor `<feed>`
    #[error("unrecognized feed format: document root <{0}>")]
    UnknownFormat(String),

    /// No root element at all
    #[error("document has no root element")]
    MissingRoot,
}

/// A single item's publication date did not match the variant's format.
#[derive(Debug, Error)]
#[error("unparseable date {raw:?}")]
pub struct DateError {
    raw: String,
}

// ============================================================================
// Normalized Output
// ============================================================================

/// Which wire format a document was detected as. Determines the date
/// format accepted for its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Rss,
    Atom,
}

/// One normalized feed entry. Transient: produced per fetch, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    /// Raw date text as it appeared in the document; empty when absent.
    pub pub_date: String,
}

/// A decoded document: feed title plus its items in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    pub title: String,
    pub kind: FeedKind,
    pub items: Vec<FeedItem>,
}

// ============================================================================
// Wire Structs
// ============================================================================

#[derive(Debug, Deserialize)]
struct RssDocument {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(default)]
    title: String,
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    description: Option<String>,
    #[serde(rename = "pubDate", default)]
    pub_date: String,
}

#[derive(Debug, Deserialize)]
struct AtomDocument {
    #[serde(default)]
    title: String,
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    title: String,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
    published: Option<String>,
    updated: Option<String>,
}

/// Text construct that tolerates markup children. `type="xhtml"` content
/// wraps its body in elements; decoding those as a plain `String` would
/// fail the whole document, so only the direct text is kept and nested
/// markup is skipped.
#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

// ============================================================================
// Parsing
// ============================================================================

/// Decode an RSS 2.0 or Atom document into a [`ParsedFeed`].
///
/// An empty item list is a valid result, not an error.
pub fn parse_feed(body: &str) -> Result<ParsedFeed, ParseError> {
    match detect_format(body)? {
        FeedKind::Rss => {
            let doc: RssDocument = quick_xml::de::from_str(body)?;
            Ok(normalize_rss(doc))
        }
        FeedKind::Atom => {
            let doc: AtomDocument = quick_xml::de::from_str(body)?;
            Ok(normalize_atom(doc))
        }
    }
}

/// Identify the wire format from the document's root element.
fn detect_format(body: &str) -> Result<FeedKind, ParseError> {
    let mut reader = quick_xml::Reader::from_str(body);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                return match e.local_name().as_ref() {
                    b"rss" => Ok(FeedKind::Rss),
                    b"feed" => Ok(FeedKind::Atom),
                    other => Err(ParseError::UnknownFormat(
                        String::from_utf8_lossy(other).into_owned(),
                    )),
                };
            }
            Event::Eof => return Err(ParseError::MissingRoot),
            // Declarations, comments, processing instructions, whitespace
            _ => {}
        }
    }
}

fn normalize_rss(doc: RssDocument) -> ParsedFeed {
    let items = doc
        .channel
        .items
        .into_iter()
        .map(|item| FeedItem {
            title: item.title,
            link: item.link,
            description: item.description.filter(|d| !d.is_empty()),
            pub_date: item.pub_date,
        })
        .collect();

    ParsedFeed {
        title: doc.channel.title,
        kind: FeedKind::Rss,
        items,
    }
}

fn normalize_atom(doc: AtomDocument) -> ParsedFeed {
    let items = doc
        .entries
        .into_iter()
        .map(|entry| {
            // Prefer the alternate (or unqualified) link over self/edit links
            let link = entry
                .links
                .iter()
                .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
                .or_else(|| entry.links.first())
                .map(|l| l.href.clone())
                .unwrap_or_default();

            let description = entry
                .summary
                .map(|s| s.value)
                .filter(|s| !s.is_empty())
                .or_else(|| entry.content.map(|c| c.value).filter(|c| !c.is_empty()));

            let pub_date = entry
                .published
                .filter(|p| !p.is_empty())
                .or_else(|| entry.updated.filter(|u| !u.is_empty()))
                .unwrap_or_default();

            FeedItem {
                title: entry.title,
                link,
                description,
                pub_date,
            }
        })
        .collect();

    ParsedFeed {
        title: doc.title,
        kind: FeedKind::Atom,
        items,
    }
}

// ============================================================================
// Date Parsing
// ============================================================================

/// RFC 1123 with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
/// Alphabetic zones (`GMT`, `EST`) are rejected.
const RSS_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Parse one item's raw date under the detected variant's policy.
///
/// RSS dates must be RFC 1123 with a numeric zone; Atom dates must be
/// RFC 3339. Anything else fails that single item.
pub fn parse_item_date(kind: FeedKind, raw: &str) -> Result<DateTime<Utc>, DateError> {
    let parsed = match kind {
        FeedKind::Rss => DateTime::parse_from_str(raw, RSS_DATE_FORMAT),
        FeedKind::Atom => DateTime::parse_from_rfc3339(raw),
    };

    parsed
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DateError {
            raw: raw.to_owned(),
        })
}

// ============================================================================
// Tests
// ============================================================================
