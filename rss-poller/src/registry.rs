use crate::config::PollerConfig;
use crate::fetcher::HttpFeedFetcher;
use crate::input::{Input, RssInput};
use crate::types::Sink;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub type InputFactory =
    Box<dyn Fn(&PollerConfig, Arc<dyn Sink>) -> anyhow::Result<Box<dyn Input>> + Send + Sync>;

/// Named input constructors. Built by the host; nothing registers itself.
#[derive(Default)]
pub struct InputRegistry {
    factories: BTreeMap<String, InputFactory>,
}

impl InputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `rss` input, fetching over HTTP.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("rss", |config, sink| {
            let fetcher = HttpFeedFetcher::new(config.fetch.clone())?;
            Ok(Box::new(RssInput::new(config, Arc::new(fetcher), sink)) as Box<dyn Input>)
        });
        registry
    }

    /// Adds or replaces the factory for `name`.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&PollerConfig, Arc<dyn Sink>) -> anyhow::Result<Box<dyn Input>>
            + Send
            + Sync
            + 'static,
    {
        debug!("Registering input {}", name);
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// `None` when nothing is registered under `name`.
    pub fn create(
        &self,
        name: &str,
        config: &PollerConfig,
        sink: Arc<dyn Sink>,
    ) -> Option<anyhow::Result<Box<dyn Input>>> {
        self.factories.get(name).map(|factory| factory(config, sink))
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
