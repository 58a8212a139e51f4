use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rss_poller::{
    ChannelSink, DedupTracker, FeedItem, FeedSource, FetchFeed, Fields, PollError, Poller,
    PollerState, Record, Sink, Tags,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tracing::info;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .try_init()
            .ok();
    });
}

/// Serves canned responses per address; addresses it does not know fail.
#[derive(Default)]
struct StubFetcher {
    feeds: Mutex<HashMap<String, Vec<FeedItem>>>,
    delays: HashMap<String, Duration>,
}

impl StubFetcher {
    fn set(&self, address: &str, items: Vec<FeedItem>) {
        self.feeds.lock().unwrap().insert(address.to_string(), items);
    }
}

#[async_trait]
impl FetchFeed for StubFetcher {
    async fn fetch(&self, address: &str) -> anyhow::Result<Vec<FeedItem>> {
        if let Some(delay) = self.delays.get(address) {
            tokio::time::sleep(*delay).await;
        }
        let feeds = self.feeds.lock().unwrap();
        match feeds.get(address) {
            Some(items) => Ok(items.clone()),
            None => bail!("connection refused"),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    records: Mutex<Vec<Record>>,
}

impl RecordingSink {
    fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }
}

impl Sink for RecordingSink {
    fn emit(
        &self,
        measurement: &str,
        fields: Fields,
        tags: Tags,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.records.lock().unwrap().push(Record {
            measurement: measurement.to_string(),
            tags,
            fields,
            timestamp,
        });
        Ok(())
    }
}

struct RejectingSink;

impl Sink for RejectingSink {
    fn emit(&self, _: &str, _: Fields, _: Tags, _: DateTime<Utc>) -> anyhow::Result<()> {
        Err(anyhow!("downstream unavailable"))
    }
}

fn source(address: &str, filters: &[&str]) -> FeedSource {
    FeedSource {
        address: address.to_string(),
        filters: filters.iter().map(|f| f.to_string()).collect(),
    }
}

fn item(guid: &str, hour: u32) -> FeedItem {
    FeedItem {
        title: format!("Post {}", guid),
        description: "summary".to_string(),
        link: format!("https://example.com/{}", guid),
        guid: Some(guid.to_string()),
        published_parsed: Some(Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_empty_source_list_is_a_no_op() {
    init_tracing();
    let sink = Arc::new(RecordingSink::default());
    let poller = Poller::new(
        Arc::new(StubFetcher::default()),
        sink.clone(),
        Arc::new(DedupTracker::identifiers()),
    );

    assert!(poller.poll_all(&[]).await.is_empty());
    assert!(sink.records().is_empty());
    assert_eq!(poller.state(), PollerState::Idle);
}

#[tokio::test]
async fn test_failing_source_does_not_block_others() {
    init_tracing();
    let fetcher = Arc::new(StubFetcher::default());
    fetcher.set("https://b.example/feed", vec![item("b1", 1), item("b2", 2)]);
    let sink = Arc::new(RecordingSink::default());
    let poller = Poller::new(fetcher, sink.clone(), Arc::new(DedupTracker::identifiers()));

    let sources = vec![
        source("https://a.example/feed", &["title"]),
        source("https://b.example/feed", &["title"]),
    ];
    let errors = poller.poll_all(&sources).await;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].address(), Some("https://a.example/feed"));
    assert!(errors[0].to_string().contains("connection refused"));

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.tags["feed"] == "https://b.example/feed"));
}

#[tokio::test]
async fn test_records_follow_item_order_and_allowlist() {
    init_tracing();
    let fetcher = Arc::new(StubFetcher::default());
    fetcher.set("https://a.example/feed", vec![item("a3", 3), item("a1", 1), item("a2", 2)]);
    let sink = Arc::new(RecordingSink::default());
    let poller = Poller::new(fetcher, sink.clone(), Arc::new(DedupTracker::identifiers()));

    let errors = poller
        .poll_all(&[source("https://a.example/feed", &["title", "guid"])])
        .await;
    assert!(errors.is_empty());

    let records = sink.records();
    let titles: Vec<&str> = records
        .iter()
        .map(|r| r.fields["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Post a3", "Post a1", "Post a2"]);
    for record in &records {
        let keys: Vec<&str> = record.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["guid", "title"]);
        assert_eq!(record.measurement, "rss");
    }
}

#[tokio::test]
async fn test_repeated_cycles_emit_new_items_only() {
    init_tracing();
    let address = "https://a.example/feed";
    let fetcher = Arc::new(StubFetcher::default());
    fetcher.set(address, vec![item("a1", 1), item("a2", 2)]);
    let sink = Arc::new(RecordingSink::default());
    let poller = Poller::new(fetcher.clone(), sink.clone(), Arc::new(DedupTracker::watermark()));
    let sources = vec![source(address, &["guid"])];

    let first = poller.poll_all_with_report(&sources).await;
    assert!(first.is_success());
    assert_eq!(first.emitted(), 2);

    let second = poller.poll_all_with_report(&sources).await;
    assert_eq!(second.emitted(), 0);
    assert_eq!(second.sources[0].fetched, 2);
    assert_ne!(first.cycle_id, second.cycle_id);

    fetcher.set(address, vec![item("a3", 3), item("a1", 1), item("a2", 2)]);
    let third = poller.poll_all_with_report(&sources).await;
    assert_eq!(third.emitted(), 1);

    let emitted: Vec<String> = sink
        .records()
        .iter()
        .map(|r| r.fields["guid"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(emitted, vec!["a1", "a2", "a3"]);

    let watermark = poller.tracker().watermark_of(address).await;
    assert_eq!(watermark, Some(Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap()));
}

#[tokio::test]
async fn test_sink_errors_are_not_poll_errors() {
    init_tracing();
    let fetcher = Arc::new(StubFetcher::default());
    fetcher.set("https://a.example/feed", vec![item("a1", 1)]);
    let poller = Poller::new(
        fetcher,
        Arc::new(RejectingSink),
        Arc::new(DedupTracker::identifiers()),
    );

    let report = poller
        .poll_all_with_report(&[source("https://a.example/feed", &["title"])])
        .await;
    assert!(report.is_success());
    assert_eq!(report.sources[0].fresh, 1);
    assert_eq!(report.sources[0].emitted, 0);
}

#[tokio::test]
async fn test_overlapping_cycle_is_rejected() {
    init_tracing();
    let slow = "https://slow.example/feed";
    let mut fetcher = StubFetcher::default();
    fetcher.delays.insert(slow.to_string(), Duration::from_millis(300));
    fetcher.set(slow, vec![item("s1", 1)]);

    let poller = Arc::new(Poller::new(
        Arc::new(fetcher),
        Arc::new(RecordingSink::default()),
        Arc::new(DedupTracker::identifiers()),
    ));
    let sources = vec![source(slow, &["title"])];

    let background = {
        let poller = poller.clone();
        let sources = sources.clone();
        tokio::spawn(async move { poller.poll_all(&sources).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(poller.state(), PollerState::Polling);

    let errors = poller.poll_all(&sources).await;
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], PollError::CycleInProgress));

    assert!(background.await.unwrap().is_empty());
    assert_eq!(poller.state(), PollerState::Idle);
}

#[tokio::test]
async fn test_slow_source_does_not_delay_fast_source() {
    init_tracing();
    let slow = "https://slow.example/feed";
    let fast = "https://fast.example/feed";
    let mut fetcher = StubFetcher::default();
    fetcher.delays.insert(slow.to_string(), Duration::from_millis(400));
    fetcher.set(slow, vec![item("s1", 1)]);
    fetcher.set(fast, vec![item("f1", 1)]);

    let (sink, mut receiver) = ChannelSink::new();
    let poller = Arc::new(Poller::new(
        Arc::new(fetcher),
        Arc::new(sink),
        Arc::new(DedupTracker::identifiers()),
    ));

    let cycle = {
        let poller = poller.clone();
        tokio::spawn(async move {
            poller
                .poll_all(&[source(slow, &["guid"]), source(fast, &["guid"])])
                .await
        })
    };

    let first = tokio::time::timeout(Duration::from_millis(200), receiver.recv())
        .await
        .expect("fast source should emit before the slow fetch returns")
        .unwrap();
    assert_eq!(first.tags["feed"], fast);
    info!("Fast source emitted while slow source was still fetching");

    assert!(cycle.await.unwrap().is_empty());
    let second = receiver.recv().await.unwrap();
    assert_eq!(second.tags["feed"], slow);
}
