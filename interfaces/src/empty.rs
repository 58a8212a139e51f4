use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::defs::FeedItem;
use crate::defs::FetchFeed;
use crate::defs::Fields;
use crate::defs::Sink;
use crate::defs::Tags;

pub struct EmptyFeed;

#[async_trait]
impl FetchFeed for EmptyFeed {
    async fn fetch(&self, _address: &str) -> Result<Vec<FeedItem>> {
        // Nothing was ever published.
        Ok(vec![])
    }
}

pub struct DiscardSink;

impl Sink for DiscardSink {
    fn emit(
        &self,
        _measurement: &str,
        _fields: Fields,
        _tags: Tags,
        _timestamp: DateTime<Utc>,
    ) -> Result<()> {
        Ok(())
    }
}
