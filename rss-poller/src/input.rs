use crate::config::{sample_config, PollerConfig};
use crate::poller::{PollReport, Poller};
use crate::types::{FeedSource, FetchFeed, PollError, Sink};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// A periodically gathered input, driven by the host's scheduler.
#[async_trait]
pub trait Input: Send + Sync {
    fn description(&self) -> &'static str;

    fn sample_config(&self) -> String;

    /// Run one collection cycle, returning per-source failures.
    async fn gather(&self) -> Vec<PollError>;
}

/// Polls the configured feeds and emits a record per new entry.
pub struct RssInput {
    sources: Vec<FeedSource>,
    poller: Poller,
}

impl RssInput {
    pub fn new(config: &PollerConfig, fetcher: Arc<dyn FetchFeed>, sink: Arc<dyn Sink>) -> Self {
        let poller = Poller::new(fetcher, sink, Arc::new(config.tracker()))
            .with_projector(config.projector());
        Self {
            sources: config.sources(),
            poller,
        }
    }

    pub fn sources(&self) -> &[FeedSource] {
        &self.sources
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub async fn gather_with_report(&self) -> PollReport {
        self.poller.poll_all_with_report(&self.sources).await
    }
}

#[async_trait]
impl Input for RssInput {
    fn description(&self) -> &'static str {
        "Read new entries from RSS, Atom and JSON feeds"
    }

    fn sample_config(&self) -> String {
        sample_config()
    }

    async fn gather(&self) -> Vec<PollError> {
        self.poller.poll_all(&self.sources).await
    }
}

/// Gather `input` every `interval` until `shutdown` resolves, or after the
/// first cycle when `once` is set. A cycle still running at shutdown is
/// abandoned. Returns the number of completed cycles.
pub async fn run_until<F>(
    input: &dyn Input,
    interval: Duration,
    once: bool,
    shutdown: F,
) -> usize
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut completed = 0;
    loop {
        // Wait for the next tick
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }

        // Run the cycle, still listening for shutdown
        tokio::select! {
            errors = input.gather() => {
                for e in errors {
                    error!("{}", e);
                }
                completed += 1;
            }
            _ = &mut shutdown => {
                info!("Shutting down during a poll cycle");
                break;
            }
        }

        if once {
            break;
        }
    }
    completed
}
