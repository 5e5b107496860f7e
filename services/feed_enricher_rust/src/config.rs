use anyhow::{Context, Result};
use oddsfeed_core::models::Lang;
use oddsfeed_core::pipeline::enrich::EnrichOptions;
use oddsfeed_core::pipeline::DEFAULT_BUFFER;
use oddsfeed_core::{RateLimiter, CONCURRENT_API_CALLS_LIMIT};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_FEED_ENDPOINT: &str = "tcp://feed_gateway:5560";
pub const DEFAULT_LANGUAGES: &str = "en";
pub const DEFAULT_REDIS_PREFIX: &str = "oddsfeed";
pub const DEFAULT_STATS_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub languages: Vec<Lang>,
    /// Catalog calls in flight at once, per enricher.
    pub concurrency: usize,
    pub buffer: usize,
    /// Preload fixtures scheduled within this many hours. Off when unset.
    pub preload_hours: Option<i64>,
}

impl PipelineConfig {
    /// Options for one enricher, with a limiter of its own.
    pub fn enrich_options(&self) -> EnrichOptions {
        EnrichOptions::new(self.languages.clone(), RateLimiter::new(self.concurrency))
    }

    pub fn from_env() -> Result<Self> {
        let languages = env::var("LANGUAGES").unwrap_or_else(|_| DEFAULT_LANGUAGES.to_string());
        Ok(Self {
            languages: Lang::parse_list(&languages)
                .map_err(anyhow::Error::msg)
                .context("invalid LANGUAGES")?,
            concurrency: env::var("CATALOG_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(CONCURRENT_API_CALLS_LIMIT),
            buffer: env::var("PIPELINE_BUFFER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_BUFFER),
            preload_hours: env::var("FIXTURE_PRELOAD_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|h| *h > 0),
        })
    }
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub feed_endpoint: String,
    /// Routing-key prefixes to subscribe to; everything when empty.
    pub feed_subscriptions: Vec<String>,
    pub store_root: Option<PathBuf>,
    pub redis_url: Option<String>,
    pub redis_prefix: String,
    pub stats_interval_secs: u64,
    pub pipeline: PipelineConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            feed_endpoint: env::var("FEED_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_FEED_ENDPOINT.to_string()),
            feed_subscriptions: split_list(&env::var("FEED_SUBSCRIPTIONS").unwrap_or_default()),
            store_root: env::var("STORE_ROOT").ok().filter(|v| !v.is_empty()).map(PathBuf::from),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            redis_prefix: env::var("REDIS_CHANNEL_PREFIX")
                .unwrap_or_else(|_| DEFAULT_REDIS_PREFIX.to_string()),
            stats_interval_secs: env::var("STATS_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_STATS_INTERVAL_SECS),
            pipeline: PipelineConfig::from_env()?,
        })
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
