use crate::types::{Author, FeedItem, FetchError};
use feed_rs::parser;
use tracing::debug;

pub struct FeedParser;

impl FeedParser {
    /// Decode an RSS/Atom/JSON feed document into items, in document order.
    pub fn parse_items(content: &[u8]) -> Result<Vec<FeedItem>, FetchError> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content)
            .map_err(|e| FetchError::Parse(format!("Failed to parse feed: {}", e)))?;

        let items: Vec<FeedItem> = feed.entries.into_iter().map(Self::convert_entry).collect();
        debug!("Parsed feed with {} entries", items.len());
        Ok(items)
    }

    fn convert_entry(entry: feed_rs::model::Entry) -> FeedItem {
        let title = entry.title.map(|t| t.content).unwrap_or_default();
        let description = entry.summary.map(|s| s.content).unwrap_or_default();
        let content = entry
            .content
            .and_then(|c| c.body)
            .unwrap_or_default();
        let link = entry
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_default();

        let author = entry.authors.into_iter().next().map(|person| Author {
            name: person.name,
            email: person.email,
        });

        let guid = if entry.id.is_empty() { None } else { Some(entry.id) };

        let categories = entry.categories.into_iter().map(|c| c.term).collect();

        FeedItem {
            title,
            description,
            content,
            link,
            updated: entry.updated.map(|t| t.to_rfc3339()).unwrap_or_default(),
            published: entry.published.map(|t| t.to_rfc3339()).unwrap_or_default(),
            updated_parsed: entry.updated,
            published_parsed: entry.published,
            author,
            guid,
            categories,
        }
    }

    /// Cheap sniff for whether a body looks like a feed at all.
    pub fn is_valid_feed_content(content: &str) -> bool {
        let content_lower = content.to_lowercase();

        let has_feed_markers = content_lower.contains("<rss")
            || content_lower.contains("<feed")
            || content_lower.contains("<rdf:rdf")
            || content_lower.contains("<channel");
        let is_json_feed = content_lower.trim_start().starts_with('{')
            && content_lower.contains("jsonfeed.org");

        has_feed_markers || is_json_feed
    }
}
