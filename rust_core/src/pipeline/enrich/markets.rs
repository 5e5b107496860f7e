use super::{EnrichOptions, FetchPool};
use crate::cache::ExpireMap;
use crate::catalog::MarketCatalog;
use crate::identity::hash32;
use crate::message::{now_millis, Event};
use crate::pipeline::{Stage, StageContext};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const MARKETS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// The catalog has no variant descriptions for player props.
pub const UNSUPPORTED_VARIANT_PREFIX: &str = "pre:playerprops";

/// Dedup key of a variant market: variant hash in the high half, market id in
/// the low half.
pub fn variant_key(market_id: i32, variant: &str) -> i64 {
    ((u64::from(hash32(variant)) << 32) | u64::from(market_id as u32)) as i64
}

/// Loads every market description when the pipeline starts, then fetches
/// descriptions of the variant markets odds changes carry.
pub struct MarketsEnricher<C> {
    catalog: Arc<C>,
    options: EnrichOptions,
    cache: Arc<ExpireMap>,
}

impl<C: MarketCatalog> MarketsEnricher<C> {
    pub fn new(catalog: Arc<C>, options: EnrichOptions) -> Self {
        Self::with_cache(catalog, options, Arc::new(ExpireMap::new(MARKETS_TTL)))
    }

    pub fn with_cache(catalog: Arc<C>, options: EnrichOptions, cache: Arc<ExpireMap>) -> Self {
        Self {
            catalog,
            options,
            cache,
        }
    }

    fn load_all(&self, pool: &FetchPool) {
        let requested_at = now_millis();
        for &lang in pool.languages() {
            let catalog = self.catalog.clone();
            pool.submit(None, lang, "markets".to_string(), async move {
                let markets = catalog.markets(lang).await?;
                Ok(Event::markets(lang, markets, requested_at))
            });
        }
    }
}

#[async_trait]
impl<C: MarketCatalog> Stage for MarketsEnricher<C> {
    fn name(&self) -> &'static str {
        "markets"
    }

    async fn run(&mut self, ctx: &mut StageContext) {
        let pool = FetchPool::start(self.name(), ctx, self.cache.clone(), &self.options);
        self.load_all(&pool);
        let mut requested = 0usize;

        while let Some(event) = ctx.recv().await {
            let received_at = event.received_at;
            let variants: Vec<(i32, String)> = event
                .odds_change()
                .map(|oc| {
                    oc.variant_markets()
                        .filter(|(_, v)| !v.starts_with(UNSUPPORTED_VARIANT_PREFIX))
                        .map(|(id, v)| (id, v.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            if !ctx.forward(event).await {
                break;
            }

            for (market_id, variant) in variants {
                let key = variant_key(market_id, &variant);
                let entity = format!("market {market_id} variant {variant}");
                let catalog = self.catalog.clone();
                let scheduled = pool.request(key, entity, move |lang| {
                    let catalog = catalog.clone();
                    let variant = variant.clone();
                    async move {
                        let markets = catalog.market_variant(lang, market_id, &variant).await?;
                        Ok(Event::markets(lang, markets, received_at))
                    }
                });
                requested += usize::from(scheduled);
            }
        }
        debug!(requested, "markets enricher done");
    }
}
