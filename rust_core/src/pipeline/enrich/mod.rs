//! Reference-data enrichers.
//!
//! Each enricher forwards its input untouched and, for every entity the event
//! references, schedules one catalog lookup per configured language. Lookups
//! are deduplicated through a TTL cache keyed by entity id, admitted through
//! the enricher's [`RateLimiter`] and executed by a fixed pool of workers sized
//! to the limiter's capacity. Results are emitted as lexicon events on the
//! same output.
//!
//! Give each enricher its own limiter. Enrichers sharing one contend for the
//! same slots.

mod competitor;
mod fixture;
mod markets;
mod player;

pub use competitor::CompetitorEnricher;
pub use fixture::FixtureEnricher;
pub use markets::{variant_key, MarketsEnricher, UNSUPPORTED_VARIANT_PREFIX};
pub use player::PlayerEnricher;

use super::{ErrorSink, EventTx, StageContext};
use crate::cache::ExpireMap;
use crate::error::{CatalogError, FeedError};
use crate::message::Event;
use crate::models::Lang;
use crate::rate_limit::RateLimiter;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Languages and call cap of one enricher. Clones share the limiter.
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub languages: Arc<[Lang]>,
    pub limiter: RateLimiter,
}

impl EnrichOptions {
    pub fn new(languages: impl Into<Arc<[Lang]>>, limiter: RateLimiter) -> Self {
        Self {
            languages: languages.into(),
            limiter,
        }
    }
}

type Job = BoxFuture<'static, ()>;

/// Per-stage fetch scheduler. Dropping it lets the workers drain the queue
/// and exit; the stage's task tracker waits for them.
pub(crate) struct FetchPool {
    stage: &'static str,
    cache: Arc<ExpireMap>,
    languages: Arc<[Lang]>,
    limiter: RateLimiter,
    output: EventTx,
    errors: ErrorSink,
    cancel: CancellationToken,
    jobs: mpsc::UnboundedSender<Job>,
}

impl FetchPool {
    pub(crate) fn start(
        stage: &'static str,
        ctx: &StageContext,
        cache: Arc<ExpireMap>,
        options: &EnrichOptions,
    ) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let workers = options.limiter.capacity();
        for _ in 0..workers {
            let rx = rx.clone();
            ctx.tasks().spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    job.await;
                }
            });
        }
        debug!(stage, workers, "fetch pool started");

        Self {
            stage,
            cache,
            languages: options.languages.clone(),
            limiter: options.limiter.clone(),
            output: ctx.output(),
            errors: ctx.errors().clone(),
            cancel: ctx.cancel_token().clone(),
            jobs,
        }
    }

    pub(crate) fn cache(&self) -> &ExpireMap {
        &self.cache
    }

    pub(crate) fn languages(&self) -> &[Lang] {
        &self.languages
    }

    /// Schedules a lookup of `key` in every language unless the key is fresh.
    /// Returns whether anything was scheduled.
    pub(crate) fn request<F, Fut>(&self, key: i64, entity: impl Into<String>, fetch: F) -> bool
    where
        F: Fn(Lang) -> Fut,
        Fut: Future<Output = Result<Event, CatalogError>> + Send + 'static,
    {
        if !self.cache.claim(key) {
            return false;
        }
        let entity = entity.into();
        for &lang in self.languages.iter() {
            self.submit(Some(key), lang, entity.clone(), fetch(lang));
        }
        true
    }

    /// Queues one lookup. With a key, the cache entry is cleared again when
    /// the lookup fails for any reason other than not-found, or never runs.
    pub(crate) fn submit<Fut>(&self, key: Option<i64>, lang: Lang, entity: String, fetch: Fut)
    where
        Fut: Future<Output = Result<Event, CatalogError>> + Send + 'static,
    {
        let stage = self.stage;
        let cache = self.cache.clone();
        let limiter = self.limiter.clone();
        let output = self.output.clone();
        let errors = self.errors.clone();
        let cancel = self.cancel.clone();

        let job = async move {
            let slot = limiter.acquire().await;
            if slot.is_none() || cancel.is_cancelled() {
                if let Some(key) = key {
                    cache.remove(key);
                }
                debug!(stage, %entity, %lang, "fetch dropped on shutdown");
                return;
            }
            let result = fetch.await;
            drop(slot);

            match result {
                Ok(event) => {
                    if output.send(event).await.is_err() {
                        debug!(stage, %entity, %lang, "output closed, enrichment dropped");
                    }
                }
                Err(source) => {
                    if let Some(key) = key {
                        if !source.is_not_found() {
                            cache.remove(key);
                        }
                    }
                    errors.report(FeedError::Catalog {
                        stage,
                        lang,
                        entity,
                        source,
                    });
                }
            }
        }
        .boxed();

        if self.jobs.send(job).is_err() {
            if let Some(key) = key {
                self.cache.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Player;
    use crate::pipeline::{spawn_stage, Stage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn player(id: i64) -> Player {
        Player {
            id,
            name: format!("player {id}"),
            full_name: None,
            nickname: None,
            kind: None,
            date_of_birth: None,
            nationality: None,
            country_code: None,
            height: None,
            weight: None,
            jersey_number: None,
            gender: None,
        }
    }

    /// Requests the ids listed in each input's `received_at`; every fetch
    /// takes 10ms and fails with not-found for even keys, transport-like
    /// errors for keys above 100.
    struct Probe {
        cache: Arc<ExpireMap>,
        options: EnrichOptions,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Stage for Probe {
        fn name(&self) -> &'static str {
            "probe"
        }

        async fn run(&mut self, ctx: &mut StageContext) {
            let pool = FetchPool::start("probe", ctx, self.cache.clone(), &self.options);
            while let Some(event) = ctx.recv().await {
                let key = event.received_at;
                if !ctx.forward(event).await {
                    break;
                }
                let calls = self.calls.clone();
                pool.request(key, format!("probe {key}"), move |lang| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        match key {
                            k if k > 100 => Err(CatalogError::Unavailable { name: "probe".into() }),
                            k if k % 2 == 0 => Err(CatalogError::NotFound { url: format!("/{k}") }),
                            k => Ok(Event::player(lang, player(k), k)),
                        }
                    }
                });
            }
        }
    }

    fn trigger(key: i64) -> Event {
        Event::decode_at(
            "-.-.-.alive.-.-.-.-",
            br#"<alive product="1" timestamp="1" subscribed="1"/>"#,
            key,
        )
        .unwrap()
    }

    async fn run_probe(keys: &[i64], cache: Arc<ExpireMap>) -> (Vec<Event>, Vec<FeedError>, usize) {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = Probe {
            cache,
            options: EnrichOptions::new(vec![Lang::En, Lang::De], RateLimiter::new(2)),
            calls: calls.clone(),
        };
        let (errors, mut error_rx) = ErrorSink::channel();
        let (tx, rx) = mpsc::channel(16);
        let (mut out, _) = spawn_stage(probe, rx, errors, CancellationToken::new(), 16);
        for &key in keys {
            tx.send(trigger(key)).await.unwrap();
        }
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = out.recv().await {
            events.push(event);
        }
        let mut errs = Vec::new();
        while let Ok(err) = error_rx.try_recv() {
            errs.push(err);
        }
        (events, errs, calls.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_one_fetch_per_language() {
        let cache = Arc::new(ExpireMap::new(Duration::from_secs(60)));
        let (events, errors, calls) = run_probe(&[1, 1, 3], cache).await;
        assert_eq!(calls, 4);
        assert!(errors.is_empty());
        // 3 forwarded plus 2 languages for each of 2 distinct ids
        assert_eq!(events.len(), 7);
        let langs: Vec<_> = events.iter().filter_map(|e| e.lang).collect();
        assert_eq!(langs.iter().filter(|l| **l == Lang::De).count(), 2);
    }

    #[tokio::test]
    async fn test_not_found_stays_cached() {
        let cache = Arc::new(ExpireMap::new(Duration::from_secs(60)));
        let (_, errors, calls) = run_probe(&[2], cache.clone()).await;
        assert_eq!(calls, 2);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(FeedError::is_not_found));
        assert!(cache.fresh(2));
    }

    #[tokio::test]
    async fn test_transient_failure_clears_cache() {
        let cache = Arc::new(ExpireMap::new(Duration::from_secs(60)));
        let (_, errors, calls) = run_probe(&[101], cache.clone()).await;
        assert_eq!(calls, 2);
        assert!(errors.iter().all(|e| !e.is_not_found()));
        assert!(!cache.fresh(101));
    }
}
