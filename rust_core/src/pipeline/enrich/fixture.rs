use super::{EnrichOptions, FetchPool};
use crate::cache::ExpireMap;
use crate::catalog::FixtureCatalog;
use crate::error::FeedError;
use crate::message::{now_millis, Event, MessageType};
use crate::models::Lang;
use crate::pipeline::{ErrorSink, EventTx, Stage, StageContext};
use crate::urn::Urn;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const FIXTURE_TTL: Duration = Duration::from_secs(60);

/// Fetches fixtures of events that change schedule, and of virtual events on
/// every odds change. Optionally preloads the whole schedule up to a horizon
/// when the pipeline starts; lookups triggered while the preload runs are
/// held back until it finishes.
pub struct FixtureEnricher<C> {
    catalog: Arc<C>,
    options: EnrichOptions,
    cache: Arc<ExpireMap>,
    preload_to: Option<DateTime<Utc>>,
}

impl<C: FixtureCatalog> FixtureEnricher<C> {
    pub fn new(catalog: Arc<C>, options: EnrichOptions) -> Self {
        Self::with_cache(catalog, options, Arc::new(ExpireMap::new(FIXTURE_TTL)))
    }

    pub fn with_cache(catalog: Arc<C>, options: EnrichOptions, cache: Arc<ExpireMap>) -> Self {
        Self {
            catalog,
            options,
            cache,
            preload_to: None,
        }
    }

    /// Preload every fixture scheduled before `before`, plus live ones.
    pub fn preload(mut self, before: DateTime<Utc>) -> Self {
        self.preload_to = Some(before);
        self
    }

    fn request(&self, pool: &FetchPool, urn: Urn, received_at: i64) -> bool {
        let key = urn.event_id();
        let entity = urn.to_string();
        let catalog = self.catalog.clone();
        pool.request(key, entity, move |lang| {
            let catalog = catalog.clone();
            let urn = urn.clone();
            async move {
                if urn.is_tournament() {
                    let tournament = catalog.tournament(lang, &urn).await?;
                    Ok(Event::tournament(lang, tournament, received_at))
                } else {
                    let fixture = catalog.fixture(lang, &urn).await?;
                    Ok(Event::fixture(lang, fixture, received_at))
                }
            }
        })
    }

    /// Forwards input while the preload runs and returns the lookups it held
    /// back. Empty when the pipeline was cancelled meanwhile.
    async fn preload_phase(&self, ctx: &mut StageContext, before: DateTime<Utc>) -> Vec<(Urn, i64)> {
        let (done_tx, mut done_rx) = oneshot::channel::<()>();
        let preload = Preload {
            languages: self.options.languages.clone(),
            cache: self.cache.clone(),
            output: ctx.output(),
            errors: ctx.errors().clone(),
            cancel: ctx.cancel_token().clone(),
        };
        let catalog = self.catalog.clone();
        ctx.tasks().spawn(async move {
            preload.run(catalog.as_ref(), before).await;
            let _ = done_tx.send(());
        });

        let mut deferred = Vec::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = &mut done_rx => None,
                event = ctx.recv() => Some(event),
            };
            match next {
                None => break,
                Some(Some(event)) => {
                    let trigger = fixture_urn(&event).map(|urn| (urn, event.received_at));
                    if !ctx.forward(event).await {
                        return Vec::new();
                    }
                    deferred.extend(trigger);
                }
                Some(None) if ctx.is_cancelled() => return Vec::new(),
                Some(None) => {
                    // input ended first; the held-back lookups still run
                    let _ = done_rx.await;
                    break;
                }
            }
        }
        if !deferred.is_empty() {
            debug!(deferred = deferred.len(), "fixture lookups held back during preload");
        }
        deferred
    }
}

#[async_trait]
impl<C: FixtureCatalog> Stage for FixtureEnricher<C> {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn run(&mut self, ctx: &mut StageContext) {
        let pool = FetchPool::start(self.name(), ctx, self.cache.clone(), &self.options);

        if let Some(before) = self.preload_to {
            for (urn, received_at) in self.preload_phase(ctx, before).await {
                self.request(&pool, urn, received_at);
            }
        }

        while let Some(event) = ctx.recv().await {
            let trigger = fixture_urn(&event).map(|urn| (urn, event.received_at));
            if !ctx.forward(event).await {
                break;
            }
            if let Some((urn, received_at)) = trigger {
                self.request(&pool, urn, received_at);
            }
        }
        debug!(cached = pool.cache().len(), "fixture enricher done");
    }
}

/// Event whose fixture should be (re)fetched because of `event`.
fn fixture_urn(event: &Event) -> Option<Urn> {
    if event.is(MessageType::OddsChange) {
        return match event.producer {
            Some(producer) if producer.is_virtual() => event.event_urn.clone(),
            _ => None,
        };
    }
    let change = event.fixture_change()?;
    let urn = if change.event_urn.is_empty() {
        event.event_urn.clone()?
    } else {
        change.event_urn.clone()
    };
    (!urn.is_test()).then_some(urn)
}

/// Bulk schedule listing, one concurrent listing per language. Listings do
/// not take limiter slots, so a long paginated listing never holds back
/// individual lookups.
struct Preload {
    languages: Arc<[Lang]>,
    cache: Arc<ExpireMap>,
    output: EventTx,
    errors: ErrorSink,
    cancel: CancellationToken,
}

impl Preload {
    async fn run<C: FixtureCatalog + ?Sized>(&self, catalog: &C, before: DateTime<Utc>) {
        let listings = self
            .languages
            .iter()
            .map(|&lang| self.list(catalog, lang, before));
        let counts = futures_util::future::join_all(listings).await;
        info!(
            fixtures = counts.iter().sum::<usize>(),
            languages = counts.len(),
            before = %before,
            "fixture preload finished"
        );
    }

    async fn list<C: FixtureCatalog + ?Sized>(&self, catalog: &C, lang: Lang, before: DateTime<Utc>) -> usize {
        let mut fixtures = catalog.fixtures(lang, before);
        let mut count = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = fixtures.next() => next,
            };
            match next {
                None => break,
                Some(Ok(fixture)) => {
                    self.cache.insert(fixture.urn.event_id());
                    if self.output.send(Event::fixture(lang, fixture, now_millis())).await.is_err() {
                        break;
                    }
                    count += 1;
                }
                Some(Err(source)) => {
                    self.errors.report(FeedError::Catalog {
                        stage: "fixture",
                        lang,
                        entity: "fixture schedule".to_string(),
                        source,
                    });
                    break;
                }
            }
        }
        debug!(%lang, count, "fixture listing done");
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(key: &str, body: &str) -> Event {
        Event::decode_at(key, body.as_bytes(), 1).unwrap()
    }

    #[test]
    fn test_fixture_change_triggers_lookup() {
        let event = decode(
            "hi.pre.-.fixture_change.1.sr:match.42.-",
            r#"<fixture_change event_id="sr:match:42" product="3" timestamp="1"/>"#,
        );
        assert_eq!(fixture_urn(&event), Some(Urn::from("sr:match:42")));

        let event = decode(
            "hi.pre.-.fixture_change.1.test:match.42.-",
            r#"<fixture_change event_id="test:match:42" product="3" timestamp="1"/>"#,
        );
        assert_eq!(fixture_urn(&event), None);
    }

    #[test]
    fn test_only_virtual_odds_changes_trigger_lookup() {
        let body = r#"<odds_change event_id="vf:match:9" product="6" timestamp="1"/>"#;
        let event = decode("hi.-.live.odds_change.1.vf:match.9.-", body);
        assert_eq!(fixture_urn(&event), Some(Urn::from("vf:match:9")));

        let body = r#"<odds_change event_id="sr:match:9" product="1" timestamp="1"/>"#;
        let event = decode("hi.-.live.odds_change.1.sr:match.9.-", body);
        assert_eq!(fixture_urn(&event), None);
    }
}
