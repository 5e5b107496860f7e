use super::{EnrichOptions, FetchPool};
use crate::cache::ExpireMap;
use crate::catalog::CompetitorCatalog;
use crate::message::Event;
use crate::pipeline::{Stage, StageContext};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const COMPETITOR_TTL: Duration = Duration::from_secs(60 * 60);

/// Fetches competitor profiles for the competitors odds change outcomes
/// name.
pub struct CompetitorEnricher<C> {
    catalog: Arc<C>,
    options: EnrichOptions,
    cache: Arc<ExpireMap>,
}

impl<C: CompetitorCatalog> CompetitorEnricher<C> {
    pub fn new(catalog: Arc<C>, options: EnrichOptions) -> Self {
        Self::with_cache(catalog, options, Arc::new(ExpireMap::new(COMPETITOR_TTL)))
    }

    pub fn with_cache(catalog: Arc<C>, options: EnrichOptions, cache: Arc<ExpireMap>) -> Self {
        Self {
            catalog,
            options,
            cache,
        }
    }
}

#[async_trait]
impl<C: CompetitorCatalog> Stage for CompetitorEnricher<C> {
    fn name(&self) -> &'static str {
        "competitor"
    }

    async fn run(&mut self, ctx: &mut StageContext) {
        let pool = FetchPool::start(self.name(), ctx, self.cache.clone(), &self.options);
        let mut requested = 0usize;

        while let Some(event) = ctx.recv().await {
            let received_at = event.received_at;
            let competitors = event
                .odds_change()
                .map(|oc| oc.competitors())
                .unwrap_or_default();
            if !ctx.forward(event).await {
                break;
            }

            for competitor_id in competitors {
                let catalog = self.catalog.clone();
                let entity = format!("competitor {competitor_id}");
                let scheduled = pool.request(competitor_id, entity, move |lang| {
                    let catalog = catalog.clone();
                    async move {
                        let competitor = catalog.competitor(lang, competitor_id).await?;
                        Ok(Event::competitor(lang, competitor, received_at))
                    }
                });
                requested += usize::from(scheduled);
            }
        }
        debug!(requested, "competitor enricher done");
    }
}
