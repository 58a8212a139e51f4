use crate::dedup::{DedupStrategy, DedupTracker};
use crate::projector::{FieldName, FieldProjector, TimestampSource};
use crate::types::{FeedSource, FetchConfig, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Feed addresses, polled in this order.
    pub feeds: Vec<String>,
    /// Item attributes to copy into each record. Unrecognised names are
    /// ignored so newer configs keep loading.
    #[serde(alias = "filter")]
    pub filters: Vec<String>,
    pub dedup: DedupStrategy,
    pub retention_hours: Option<u64>,
    pub timestamp: TimestampSource,
    pub interval_seconds: u64,
    pub fetch: FetchConfig,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            filters: FieldName::ALL.iter().map(|f| f.as_str().to_string()).collect(),
            dedup: DedupStrategy::default(),
            retention_hours: None,
            timestamp: TimestampSource::default(),
            interval_seconds: 60,
            fetch: FetchConfig::default(),
        }
    }
}

impl PollerConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: PollerConfig = serde_json::from_str(raw)?;
        let unknown = config.unknown_filters();
        if !unknown.is_empty() {
            debug!("Ignoring unknown filters: {:?}", unknown);
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// One source per configured feed, all sharing the filter list.
    pub fn sources(&self) -> Vec<FeedSource> {
        self.feeds
            .iter()
            .map(|address| FeedSource {
                address: address.clone(),
                filters: self.filters.clone(),
            })
            .collect()
    }

    pub fn tracker(&self) -> DedupTracker {
        let tracker = DedupTracker::new(self.dedup);
        match (self.dedup, self.retention_hours) {
            (DedupStrategy::Identifiers, Some(hours)) => {
                match i64::try_from(hours).ok().and_then(chrono::Duration::try_hours) {
                    Some(retention) => tracker.with_retention(retention),
                    None => {
                        warn!(
                            "retention_hours {} is out of range, keeping every identifier",
                            hours
                        );
                        tracker
                    }
                }
            }
            (_, Some(_)) => {
                warn!("retention_hours has no effect with the {:?} strategy", self.dedup);
                tracker
            }
            (_, None) => tracker,
        }
    }

    pub fn projector(&self) -> FieldProjector {
        FieldProjector::new(self.timestamp)
    }

    pub fn unknown_filters(&self) -> Vec<&str> {
        self.filters
            .iter()
            .map(String::as_str)
            .filter(|name| FieldName::parse(name).is_none())
            .collect()
    }
}

/// Example configuration, as printed by `--sample-config`.
pub fn sample_config() -> String {
    let sample = PollerConfig {
        feeds: vec!["http://feed.feed/feediemcfeed".to_string()],
        ..Default::default()
    };
    serde_json::to_string_pretty(&sample).unwrap_or_default()
}
