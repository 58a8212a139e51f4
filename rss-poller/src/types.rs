use serde::{Deserialize, Serialize};

pub use interfaces::defs::{Author, FeedItem, FeedSource, FetchFeed, Fields, Record, Sink, Tags};

/// Measurement name every record is emitted under.
pub const MEASUREMENT: &str = "rss";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub follow_redirects: bool,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "RSS-Poller/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 5,
            max_feed_size_mb: 10,
            follow_redirects: true,
            max_redirects: 5,
        }
    }
}

/// Errors raised inside the HTTP fetch collaborator.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported URL scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },
}

/// Per-source failure collected by a poll cycle.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("failed to fetch {address}: {error:#}")]
    Fetch { address: String, error: anyhow::Error },

    #[error("a poll cycle is already in progress")]
    CycleInProgress,
}

impl PollError {
    /// Address of the source the error belongs to, if any.
    pub fn address(&self) -> Option<&str> {
        match self {
            PollError::Fetch { address, .. } => Some(address),
            PollError::CycleInProgress => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
