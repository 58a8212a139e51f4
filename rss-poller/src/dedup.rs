use crate::types::FeedItem;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// How a tracker decides that an item was already reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupStrategy {
    /// Remember every reported identifier. Without a retention window the
    /// set grows for the life of the process.
    #[default]
    Identifiers,
    /// Remember only the newest publish time per source.
    Watermark,
    /// Report every item on every poll.
    #[serde(rename = "none")]
    Passthrough,
}

/// Identifiers reported for one source, with a recency index so entries
/// not seen for a while can be dropped oldest-first.
#[derive(Debug, Default)]
struct SeenIdentifiers {
    last_seen: HashMap<String, DateTime<Utc>>,
    recency: BTreeSet<(DateTime<Utc>, String)>,
}

impl SeenIdentifiers {
    /// Records `key` as seen at `now`. Returns true the first time.
    fn observe(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        match self.last_seen.insert(key.to_string(), now) {
            Some(previous) => {
                self.recency.remove(&(previous, key.to_string()));
                self.recency.insert((now, key.to_string()));
                false
            }
            None => {
                self.recency.insert((now, key.to_string()));
                true
            }
        }
    }

    fn evict_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut evicted = 0;
        while let Some((seen_at, _)) = self.recency.first() {
            if *seen_at >= cutoff {
                break;
            }
            if let Some((_, key)) = self.recency.pop_first() {
                self.last_seen.remove(&key);
                evicted += 1;
            }
        }
        evicted
    }

    fn len(&self) -> usize {
        self.last_seen.len()
    }
}

#[derive(Debug)]
enum SourceState {
    Identifiers(SeenIdentifiers),
    Watermark(DateTime<Utc>),
}

/// Per-source polling state. Share one instance (behind an `Arc`) between
/// everything that polls the same sources; each source has its own lock.
#[derive(Debug)]
pub struct DedupTracker {
    strategy: DedupStrategy,
    retention: Option<Duration>,
    shards: RwLock<HashMap<String, Arc<Mutex<SourceState>>>>,
}

impl DedupTracker {
    pub fn new(strategy: DedupStrategy) -> Self {
        Self {
            strategy,
            retention: None,
            shards: RwLock::new(HashMap::new()),
        }
    }

    pub fn identifiers() -> Self {
        Self::new(DedupStrategy::Identifiers)
    }

    pub fn watermark() -> Self {
        Self::new(DedupStrategy::Watermark)
    }

    pub fn passthrough() -> Self {
        Self::new(DedupStrategy::Passthrough)
    }

    /// Forget identifiers that have not appeared in a feed for longer than
    /// `retention`. Only affects the identifiers strategy. A window that is
    /// not positive is ignored and the set stays unbounded.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        if retention <= Duration::zero() {
            warn!("Ignoring non-positive retention window {}", retention);
            return self;
        }
        self.retention = Some(retention);
        self
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention
    }

    pub fn strategy(&self) -> DedupStrategy {
        self.strategy
    }

    /// Returns the items of `items` not reported before for `source_id`,
    /// in their original order, and records them as reported.
    pub async fn filter(&self, source_id: &str, items: Vec<FeedItem>) -> Vec<FeedItem> {
        self.filter_at(source_id, items, Utc::now()).await
    }

    /// Same as [`filter`](Self::filter) with an explicit clock reading.
    pub async fn filter_at(
        &self,
        source_id: &str,
        items: Vec<FeedItem>,
        now: DateTime<Utc>,
    ) -> Vec<FeedItem> {
        if self.strategy == DedupStrategy::Passthrough {
            return items;
        }

        // Hold this source's lock for the whole check-then-record pass.
        let shard = self.shard(source_id).await;
        let mut state = shard.lock().await;
        let total = items.len();

        let fresh = match &mut *state {
            SourceState::Identifiers(seen) => {
                // Check and record each identifier in one step so duplicates
                // inside the batch are reported once.
                let fresh: Vec<FeedItem> = items
                    .into_iter()
                    .filter(|item| match identity(item) {
                        Some(key) => seen.observe(key, now),
                        // Nothing to remember it by.
                        None => true,
                    })
                    .collect();

                // Evict after observing, so anything still in the feed survives.
                // A window reaching past the earliest representable time
                // evicts nothing.
                if let Some(cutoff) = self.retention.and_then(|r| now.checked_sub_signed(r)) {
                    let evicted = seen.evict_before(cutoff);
                    if evicted > 0 {
                        debug!("Evicted {} identifiers for {}", evicted, source_id);
                    }
                }
                fresh
            }
            SourceState::Watermark(watermark) => {
                // Newest over the whole batch, stale items included.
                let newest = items.iter().filter_map(|item| item.published_parsed).max();
                let fresh: Vec<FeedItem> = items
                    .into_iter()
                    .filter(|item| match item.published_parsed {
                        Some(published) => published > *watermark,
                        None => true,
                    })
                    .collect();

                // Only ever move forward.
                if let Some(newest) = newest {
                    if newest > *watermark {
                        *watermark = newest;
                    }
                }
                fresh
            }
        };

        debug!("{}: {} of {} items fresh", source_id, fresh.len(), total);
        fresh
    }

    /// Current watermark for `source_id`, or `None` unless the tracker uses
    /// the watermark strategy. Unpolled sources sit at the minimum time.
    pub async fn watermark_of(&self, source_id: &str) -> Option<DateTime<Utc>> {
        if self.strategy != DedupStrategy::Watermark {
            return None;
        }
        let shards = self.shards.read().await;
        match shards.get(source_id) {
            Some(shard) => match &*shard.lock().await {
                SourceState::Watermark(watermark) => Some(*watermark),
                SourceState::Identifiers(_) => None,
            },
            None => Some(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// Number of identifiers remembered for `source_id`.
    pub async fn remembered(&self, source_id: &str) -> usize {
        let shards = self.shards.read().await;
        match shards.get(source_id) {
            Some(shard) => match &*shard.lock().await {
                SourceState::Identifiers(seen) => seen.len(),
                SourceState::Watermark(_) => 0,
            },
            None => 0,
        }
    }

    async fn shard(&self, source_id: &str) -> Arc<Mutex<SourceState>> {
        {
            let shards = self.shards.read().await;
            if let Some(shard) = shards.get(source_id) {
                return shard.clone();
            }
        }

        let mut shards = self.shards.write().await;
        shards
            .entry(source_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(self.initial_state())))
            .clone()
    }

    fn initial_state(&self) -> SourceState {
        match self.strategy {
            DedupStrategy::Watermark => SourceState::Watermark(DateTime::<Utc>::MIN_UTC),
            _ => SourceState::Identifiers(SeenIdentifiers::default()),
        }
    }
}

/// Stable key for an item: its GUID, else its permalink.
fn identity(item: &FeedItem) -> Option<&str> {
    item.guid
        .as_deref()
        .filter(|guid| !guid.is_empty())
        .or_else(|| Some(item.link.as_str()).filter(|link| !link.is_empty()))
}
