//! HTTP client for the reference-data catalog.

use super::breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use crate::catalog::{CompetitorCatalog, FixtureCatalog, MarketCatalog, PlayerCatalog};
use crate::error::CatalogError;
use crate::models::catalog::{
    decode_competitor, decode_fixture, decode_markets, decode_player, decode_schedule,
    decode_tournament,
};
use crate::models::{Competitor, Fixture, FixtureTournament, Lang, MarketDescriptions, Player};
use crate::urn::Urn;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use quick_xml::DeError;
use rand::Rng;
use reqwest::{Client, StatusCode};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_CATALOG_URL: &str = "https://api.betradar.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Prematch schedule page size.
pub const SCHEDULE_PAGE: usize = 1000;

const ACCESS_TOKEN_HEADER: &str = "x-access-token";
const MAX_ERROR_BODY: usize = 256;

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
    /// Attempts per request, first one included.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub breaker: BreakerConfig,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CATALOG_URL.to_string(),
            token: String::new(),
            timeout: DEFAULT_TIMEOUT,
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            breaker: BreakerConfig::default(),
        }
    }
}

impl CatalogConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("CATALOG_URL").unwrap_or(defaults.base_url),
            token: env::var("CATALOG_TOKEN").unwrap_or(defaults.token),
            timeout: env::var("CATALOG_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_attempts: env::var("CATALOG_RETRY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_attempts),
            base_backoff: defaults.base_backoff,
            max_backoff: defaults.max_backoff,
            breaker: BreakerConfig::from_env(),
        }
    }
}

/// Catalog paths, relative to the base URL.
pub mod paths {
    use crate::models::Lang;
    use crate::urn::Urn;

    pub fn markets(lang: Lang) -> String {
        format!("/v1/descriptions/{lang}/markets.xml?include_mappings=false")
    }

    pub fn market_variant(lang: Lang, market_id: i32, variant: &str) -> String {
        format!("/v1/descriptions/{lang}/markets/{market_id}/variants/{variant}?include_mappings=false")
    }

    /// Serves both match fixtures and tournament info.
    pub fn fixture(lang: Lang, urn: &Urn) -> String {
        format!("/v1/sports/{lang}/sport_events/{urn}/fixture.xml")
    }

    pub fn player(lang: Lang, player_id: i64) -> String {
        format!("/v1/sports/{lang}/players/sr:player:{player_id}/profile.xml")
    }

    pub fn competitor(lang: Lang, competitor_id: i64) -> String {
        format!("/v1/sports/{lang}/competitors/sr:competitor:{competitor_id}/profile.xml")
    }

    pub fn live_schedule(lang: Lang) -> String {
        format!("/v1/sports/{lang}/schedules/live/schedule.xml")
    }

    pub fn prematch_schedule(lang: Lang, start: usize, limit: usize) -> String {
        format!("/v1/sports/{lang}/schedules/pre/schedule.xml?start={start}&limit={limit}")
    }
}

#[derive(Clone)]
pub struct HttpCatalog {
    client: Client,
    base_url: Arc<str>,
    token: Arc<str>,
    config: Arc<CatalogConfig>,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl std::fmt::Debug for HttpCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCatalog")
            .field("base_url", &self.base_url)
            .field("circuit_breaker_state", &self.circuit_breaker.state())
            .finish()
    }
}

impl HttpCatalog {
    pub fn new(config: CatalogConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').into(),
            token: config.token.as_str().into(),
            circuit_breaker: Arc::new(CircuitBreaker::new("catalog", config.breaker.clone())),
            config: Arc::new(config),
        }
    }

    pub fn from_env() -> Self {
        Self::new(CatalogConfig::from_env())
    }

    /// Whether the circuit breaker lets calls through.
    pub fn is_available(&self) -> bool {
        self.circuit_breaker.is_available()
    }

    pub fn circuit_state(&self) -> BreakerState {
        self.circuit_breaker.state()
    }

    pub fn reset_circuit_breaker(&self) {
        self.circuit_breaker.reset();
    }

    async fn get<T>(&self, path: &str, decode: fn(&[u8]) -> Result<T, DeError>) -> Result<T, CatalogError> {
        let url = format!("{}{}", self.base_url, path);
        if !self.circuit_breaker.is_available() {
            return Err(CatalogError::Unavailable {
                name: self.circuit_breaker.name().to_string(),
            });
        }

        let result = self.get_with_retry(&url).await;
        match &result {
            // a missing entity says nothing about the catalog's health
            Ok(_) | Err(CatalogError::NotFound { .. }) => self.circuit_breaker.record_success(),
            Err(_) => self.circuit_breaker.record_failure(),
        }

        let body = result?;
        decode(&body).map_err(|source| CatalogError::Decode { url, source })
    }

    async fn get_with_retry(&self, url: &str) -> Result<Vec<u8>, CatalogError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch(url).await {
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        url,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "catalog request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                other => return other,
            }
        }
    }

    /// Exponential backoff with up to 20% jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.base_backoff.as_millis() as u64;
        let exp = base.saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.config.max_backoff.as_millis() as u64);
        let jitter = rand::thread_rng().gen_range(0..=capped / 5);
        Duration::from_millis(capped + jitter)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CatalogError> {
        let transport = |source| CatalogError::Transport {
            url: url.to_string(),
            source,
        };
        let resp = self
            .client
            .get(url)
            .header(ACCESS_TOKEN_HEADER, self.token.as_ref())
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound { url: url.to_string() });
        }
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            return Err(CatalogError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.bytes().await.map_err(transport)?;
        debug!(url, bytes = body.len(), "catalog response");
        Ok(body.to_vec())
    }
}

#[derive(Debug, Clone, Copy)]
enum SchedulePage {
    Live,
    Prematch { start: usize },
}

#[async_trait]
impl PlayerCatalog for HttpCatalog {
    async fn player(&self, lang: Lang, player_id: i64) -> Result<Player, CatalogError> {
        self.get(&paths::player(lang, player_id), decode_player).await
    }
}

#[async_trait]
impl CompetitorCatalog for HttpCatalog {
    async fn competitor(&self, lang: Lang, competitor_id: i64) -> Result<Competitor, CatalogError> {
        self.get(&paths::competitor(lang, competitor_id), decode_competitor)
            .await
    }
}

#[async_trait]
impl FixtureCatalog for HttpCatalog {
    async fn fixture(&self, lang: Lang, event_urn: &Urn) -> Result<Fixture, CatalogError> {
        self.get(&paths::fixture(lang, event_urn), decode_fixture).await
    }

    async fn tournament(&self, lang: Lang, urn: &Urn) -> Result<FixtureTournament, CatalogError> {
        self.get(&paths::fixture(lang, urn), decode_tournament).await
    }

    /// Live schedule first, then prematch pages until one contains a fixture
    /// scheduled after `before` or comes back empty.
    fn fixtures(
        &self,
        lang: Lang,
        before: DateTime<Utc>,
    ) -> BoxStream<'static, Result<Fixture, CatalogError>> {
        let client = self.clone();
        stream::unfold(Some(SchedulePage::Live), move |page| {
            let client = client.clone();
            async move {
                let page = page?;
                let path = match page {
                    SchedulePage::Live => paths::live_schedule(lang),
                    SchedulePage::Prematch { start } => paths::prematch_schedule(lang, start, SCHEDULE_PAGE),
                };
                let fixtures = match client.get(&path, decode_schedule).await {
                    Ok(fixtures) => fixtures,
                    Err(err) => return Some((vec![Err(err)], None)),
                };
                let next = match page {
                    SchedulePage::Live => Some(SchedulePage::Prematch { start: 0 }),
                    SchedulePage::Prematch { start } => {
                        let past_horizon = fixtures
                            .iter()
                            .any(|f| f.scheduled.map_or(false, |at| at > before));
                        (!past_horizon && !fixtures.is_empty())
                            .then_some(SchedulePage::Prematch { start: start + SCHEDULE_PAGE })
                    }
                };
                debug!(%lang, ?page, fixtures = fixtures.len(), "schedule page");
                Some((fixtures.into_iter().map(Ok).collect::<Vec<_>>(), next))
            }
        })
        .flat_map(stream::iter)
        .boxed()
    }
}

#[async_trait]
impl MarketCatalog for HttpCatalog {
    async fn markets(&self, lang: Lang) -> Result<MarketDescriptions, CatalogError> {
        self.get(&paths::markets(lang), decode_markets).await
    }

    async fn market_variant(
        &self,
        lang: Lang,
        market_id: i32,
        variant: &str,
    ) -> Result<MarketDescriptions, CatalogError> {
        self.get(&paths::market_variant(lang, market_id, variant), decode_markets)
            .await
    }
}
