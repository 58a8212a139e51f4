use crate::dedup::DedupTracker;
use crate::projector::FieldProjector;
use crate::types::{FeedSource, FetchFeed, PollError, Sink};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
}

/// Outcome of one source within a cycle.
#[derive(Debug, Clone, Default)]
pub struct SourceSummary {
    pub address: String,
    pub fetched: usize,
    pub fresh: usize,
    pub emitted: usize,
    pub failed: bool,
}

#[derive(Debug)]
pub struct PollReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub sources: Vec<SourceSummary>,
    pub errors: Vec<PollError>,
}

impl PollReport {
    fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            started_at,
            sources: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn emitted(&self) -> usize {
        self.sources.iter().map(|s| s.emitted).sum()
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Flips the poller back to idle however the cycle ends, including when
/// the cycle future is dropped half way.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs poll cycles: fetch, dedup, project, emit.
pub struct Poller {
    fetcher: Arc<dyn FetchFeed>,
    sink: Arc<dyn Sink>,
    tracker: Arc<DedupTracker>,
    projector: FieldProjector,
    polling: AtomicBool,
}

impl Poller {
    pub fn new(
        fetcher: Arc<dyn FetchFeed>,
        sink: Arc<dyn Sink>,
        tracker: Arc<DedupTracker>,
    ) -> Self {
        Self {
            fetcher,
            sink,
            tracker,
            projector: FieldProjector::default(),
            polling: AtomicBool::new(false),
        }
    }

    pub fn with_projector(mut self, projector: FieldProjector) -> Self {
        self.projector = projector;
        self
    }

    pub fn state(&self) -> PollerState {
        if self.polling.load(Ordering::Acquire) {
            PollerState::Polling
        } else {
            PollerState::Idle
        }
    }

    pub fn tracker(&self) -> Arc<DedupTracker> {
        self.tracker.clone()
    }

    /// Poll every source once. Returns one error per failed source; an
    /// empty list means every fetch succeeded.
    pub async fn poll_all(&self, sources: &[FeedSource]) -> Vec<PollError> {
        self.poll_all_with_report(sources).await.errors
    }

    pub async fn poll_all_with_report(&self, sources: &[FeedSource]) -> PollReport {
        let started_at = Utc::now();
        if sources.is_empty() {
            return PollReport::empty(started_at);
        }

        if self
            .polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Poll requested while a cycle is still running, skipping");
            let mut report = PollReport::empty(started_at);
            report.errors.push(PollError::CycleInProgress);
            return report;
        }
        let _guard = CycleGuard(&self.polling);

        let cycle_id = Uuid::new_v4();
        info!("Poll cycle {} started for {} sources", cycle_id, sources.len());

        let outcomes = join_all(
            sources
                .iter()
                .map(|source| self.poll_source(source, started_at)),
        )
        .await;

        let mut report = PollReport {
            cycle_id,
            started_at,
            sources: Vec::with_capacity(outcomes.len()),
            errors: Vec::new(),
        };
        for (summary, error) in outcomes {
            report.sources.push(summary);
            if let Some(error) = error {
                report.errors.push(error);
            }
        }

        info!(
            "Poll cycle {} finished: {} records emitted, {} sources failed",
            cycle_id,
            report.emitted(),
            report.errors.len()
        );
        report
    }

    async fn poll_source(
        &self,
        source: &FeedSource,
        poll_time: DateTime<Utc>,
    ) -> (SourceSummary, Option<PollError>) {
        let mut summary = SourceSummary {
            address: source.address.clone(),
            ..Default::default()
        };

        let items = match self.fetcher.fetch(&source.address).await {
            Ok(items) => items,
            Err(error) => {
                warn!("Failed to fetch {}: {:#}", source.address, error);
                summary.failed = true;
                let error = PollError::Fetch {
                    address: source.address.clone(),
                    error,
                };
                return (summary, Some(error));
            }
        };
        summary.fetched = items.len();

        let fresh = self.tracker.filter(&source.address, items).await;
        summary.fresh = fresh.len();

        for item in &fresh {
            let record = self
                .projector
                .project(item, &source.filters, &source.address, poll_time);
            match self.sink.emit_record(record) {
                Ok(()) => summary.emitted += 1,
                Err(e) => warn!("Sink rejected record from {}: {:#}", source.address, e),
            }
        }

        debug!(
            "{}: fetched {}, fresh {}, emitted {}",
            source.address, summary.fetched, summary.fresh, summary.emitted
        );
        (summary, None)
    }
}
