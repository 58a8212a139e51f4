use crate::types::{FeedItem, Fields, Record, Tags, MEASUREMENT};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Item attributes that can be projected into a record's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldName {
    Title,
    Description,
    Content,
    Link,
    Updated,
    Published,
    Author,
    Guid,
}

impl FieldName {
    pub const ALL: [FieldName; 8] = [
        FieldName::Title,
        FieldName::Description,
        FieldName::Content,
        FieldName::Link,
        FieldName::Updated,
        FieldName::Published,
        FieldName::Author,
        FieldName::Guid,
    ];

    /// Returns `None` for names this version does not know about.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "title" => Some(FieldName::Title),
            "description" => Some(FieldName::Description),
            "content" => Some(FieldName::Content),
            "link" => Some(FieldName::Link),
            "updated" => Some(FieldName::Updated),
            "published" => Some(FieldName::Published),
            "author" => Some(FieldName::Author),
            "guid" => Some(FieldName::Guid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Title => "title",
            FieldName::Description => "description",
            FieldName::Content => "content",
            FieldName::Link => "link",
            FieldName::Updated => "updated",
            FieldName::Published => "published",
            FieldName::Author => "author",
            FieldName::Guid => "guid",
        }
    }

    fn extract(&self, item: &FeedItem) -> Option<String> {
        match self {
            FieldName::Title => Some(item.title.clone()),
            FieldName::Description => Some(item.description.clone()),
            FieldName::Content => Some(item.content.clone()),
            FieldName::Link => Some(item.link.clone()),
            FieldName::Updated => Some(item.updated.clone()),
            FieldName::Published => Some(item.published.clone()),
            FieldName::Author => item.author.as_ref().map(|a| a.name.clone()),
            FieldName::Guid => item.guid.clone(),
        }
    }
}

/// Where a record's event time comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampSource {
    /// The item's parsed publish time, falling back to the poll time.
    #[default]
    Published,
    /// Always the poll time.
    Poll,
}

/// Maps fetched items to records. Holds no state between calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldProjector {
    timestamp_source: TimestampSource,
}

impl FieldProjector {
    pub fn new(timestamp_source: TimestampSource) -> Self {
        Self { timestamp_source }
    }

    pub fn project(
        &self,
        item: &FeedItem,
        allowlist: &[String],
        source_id: &str,
        poll_time: DateTime<Utc>,
    ) -> Record {
        // Category labels become tag keys directly, so labels that collide
        // collapse into one tag. `feed` is written last and always wins.
        let mut tags = Tags::new();
        for category in &item.categories {
            tags.insert(category.clone(), "true".to_string());
        }
        tags.insert("feed".to_string(), source_id.to_string());

        let mut fields = Fields::new();
        for name in allowlist.iter().filter_map(|n| FieldName::parse(n)) {
            if let Some(value) = name.extract(item) {
                fields.insert(name.as_str().to_string(), Value::String(strip_newlines(&value)));
            }
        }

        let timestamp = match self.timestamp_source {
            TimestampSource::Published => item.published_parsed.unwrap_or(poll_time),
            TimestampSource::Poll => poll_time,
        };

        Record {
            measurement: MEASUREMENT.to_string(),
            tags,
            fields,
            timestamp,
        }
    }
}

/// Remove line breaks, which break line-oriented sinks.
pub fn strip_newlines(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '\n' | '\r')).collect()
}
