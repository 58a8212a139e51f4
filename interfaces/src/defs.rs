use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Field values keyed by field name.
pub type Fields = BTreeMap<String, serde_json::Value>;

/// Tag values keyed by tag name.
pub type Tags = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: Option<String>,
}

/// One feed entry as handed over by a fetch collaborator.
///
/// Raw date strings are kept next to their parsed forms because feeds are
/// not reliable about either; an entry may carry one without the other.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub description: String,
    pub content: String,
    pub link: String,
    pub updated: String,
    pub published: String,
    pub updated_parsed: Option<DateTime<Utc>>,
    pub published_parsed: Option<DateTime<Utc>>,
    pub author: Option<Author>,
    pub guid: Option<String>,
    pub categories: Vec<String>,
}

/// A configured feed: its fetch address plus the fields to project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub address: String,
    pub filters: Vec<String>,
}

/// Structured output for one fresh item.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub measurement: String,
    pub tags: Tags,
    pub fields: Fields,
    pub timestamp: DateTime<Utc>,
}

// Collaborators are shared across concurrent per-source tasks, so both
// traits take `&self` and implementations handle their own interior state.

#[async_trait]
pub trait FetchFeed: Send + Sync {
    /// Retrieve and decode the feed at `address`.
    async fn fetch(&self, address: &str) -> Result<Vec<FeedItem>>;
}

pub trait Sink: Send + Sync {
    /// Accept one record. Must not block on downstream delivery.
    fn emit(
        &self,
        measurement: &str,
        fields: Fields,
        tags: Tags,
        timestamp: DateTime<Utc>,
    ) -> Result<()>;

    fn emit_record(&self, record: Record) -> Result<()> {
        self.emit(&record.measurement, record.fields, record.tags, record.timestamp)
    }
}
