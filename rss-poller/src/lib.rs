pub mod config;
pub mod dedup;
pub mod fetcher;
pub mod input;
pub mod parser;
pub mod poller;
pub mod projector;
pub mod registry;
pub mod sinks;
pub mod types;

pub use config::PollerConfig;
pub use dedup::{DedupStrategy, DedupTracker};
pub use fetcher::HttpFeedFetcher;
pub use input::{Input, RssInput};
pub use parser::FeedParser;
pub use poller::{PollReport, Poller, PollerState};
pub use projector::{FieldName, FieldProjector, TimestampSource};
pub use registry::InputRegistry;
pub use sinks::{ChannelSink, LineProtocolSink};
pub use types::*;
