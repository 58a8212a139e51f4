use crate::parser::FeedParser;
use crate::types::{FeedItem, FetchConfig, FetchError, FetchFeed};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Cache validators remembered per feed for conditional requests.
#[derive(Debug, Clone, Default)]
struct Validators {
    etag: Option<String>,
    last_modified: Option<String>,
}

enum Fetched {
    NotModified,
    Body { bytes: Vec<u8>, validators: Validators },
}

/// Fetch collaborator backed by reqwest and feed-rs.
pub struct HttpFeedFetcher {
    client: Client,
    config: FetchConfig,
    validators: Arc<RwLock<HashMap<String, Validators>>>,
    rate_limiter: Arc<RwLock<HashMap<String, Instant>>>,
}

impl HttpFeedFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let redirect = if config.follow_redirects {
            reqwest::redirect::Policy::limited(config.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(redirect)
            .build()?;

        Ok(Self {
            client,
            config,
            validators: Arc::new(RwLock::new(HashMap::new())),
            rate_limiter: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub async fn fetch_items(&self, url: &str) -> Result<Vec<FeedItem>, FetchError> {
        // Validate the address before touching the network
        let parsed_url = Url::parse(url)?;
        if parsed_url.scheme() != "http" && parsed_url.scheme() != "https" {
            return Err(FetchError::UnsupportedScheme {
                scheme: parsed_url.scheme().to_string(),
            });
        }

        // Apply rate limiting
        self.apply_rate_limit(&parsed_url).await;

        // Reuse validators from the last successful fetch
        let validators = self
            .validators
            .read()
            .await
            .get(url)
            .cloned()
            .unwrap_or_default();

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            match self.fetch_once(url, &validators).await {
                Ok(Fetched::NotModified) => {
                    debug!("Feed not modified: {}", url);
                    return Ok(Vec::new());
                }
                Ok(Fetched::Body { bytes, validators }) => {
                    info!("Fetched feed: {} ({} bytes)", url, bytes.len());

                    // Remember cache headers for the next conditional request
                    self.validators
                        .write()
                        .await
                        .insert(url.to_string(), validators);
                    if let Ok(text) = std::str::from_utf8(&bytes) {
                        if !FeedParser::is_valid_feed_content(text) {
                            warn!("Response from {} does not look like a feed", url);
                        }
                    }

                    // Parse the feed content
                    return FeedParser::parse_items(&bytes);
                }
                Err(e) if is_retryable(&e) && attempt < self.config.max_retries => {
                    attempt += 1;
                    match backoff.next_backoff() {
                        Some(delay) => {
                            warn!(
                                "Attempt {} failed for {}: {}, retrying in {:?}",
                                attempt, url, e, delay
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str, validators: &Validators) -> Result<Fetched, FetchError> {
        let mut request = self.client.get(url);

        if let Some(etag) = &validators.etag {
            request = request.header("If-None-Match", etag);
        }
        if let Some(last_modified) = &validators.last_modified {
            request = request.header("If-Modified-Since", last_modified);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            return Ok(Fetched::NotModified);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        // Extract headers for caching
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        let validators = Validators {
            etag: header("etag"),
            last_modified: header("last-modified"),
        };

        // Check content length
        let limit = self.config.max_feed_size_mb * 1024 * 1024;
        if let Some(content_length) = response.content_length() {
            if content_length as usize > limit {
                return Err(FetchError::FeedTooLarge {
                    size_mb: content_length as usize / (1024 * 1024),
                });
            }
        }

        let bytes = response.bytes().await?;
        if bytes.len() > limit {
            return Err(FetchError::FeedTooLarge {
                size_mb: bytes.len() / (1024 * 1024),
            });
        }

        Ok(Fetched::Body {
            bytes: bytes.to_vec(),
            validators,
        })
    }

    /// At most one request per second to any single host.
    async fn apply_rate_limit(&self, url: &Url) {
        let host = url.host_str().unwrap_or("").to_string();
        let min_interval = Duration::from_secs(1);

        let wait = {
            let mut rate_limiter = self.rate_limiter.write().await;
            let now = Instant::now();
            let next_slot = match rate_limiter.get(&host) {
                Some(last) if now.duration_since(*last) < min_interval => *last + min_interval,
                _ => now,
            };
            rate_limiter.insert(host.clone(), next_slot);
            next_slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            debug!("Rate limiting {}: waiting {:?}", host, wait);
            tokio::time::sleep(wait).await;
        }
    }
}

fn is_retryable(error: &FetchError) -> bool {
    match error {
        FetchError::Http(_) => true,
        FetchError::Status { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

#[async_trait]
impl FetchFeed for HttpFeedFetcher {
    async fn fetch(&self, address: &str) -> anyhow::Result<Vec<FeedItem>> {
        Ok(self.fetch_items(address).await?)
    }
}
