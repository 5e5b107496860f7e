use super::{EnrichOptions, FetchPool};
use crate::cache::ExpireMap;
use crate::catalog::PlayerCatalog;
use crate::message::Event;
use crate::pipeline::{Stage, StageContext};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const PLAYER_TTL: Duration = Duration::from_secs(60 * 60);

/// Fetches profiles of players referenced by odds change outcomes.
pub struct PlayerEnricher<C> {
    catalog: Arc<C>,
    options: EnrichOptions,
    cache: Arc<ExpireMap>,
}

impl<C: PlayerCatalog> PlayerEnricher<C> {
    pub fn new(catalog: Arc<C>, options: EnrichOptions) -> Self {
        Self::with_cache(catalog, options, Arc::new(ExpireMap::new(PLAYER_TTL)))
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
impl<C: PlayerCatalog> Stage for PlayerEnricher<C> {
    fn name(&self) -> &'static str {
        "player"
    }

    async fn run(&mut self, ctx: &mut StageContext) {
        let pool = FetchPool::start(self.name(), ctx, self.cache.clone(), &self.options);
        let mut requested = 0usize;

        while let Some(event) = ctx.recv().await {
            let received_at = event.received_at;
            let players: Vec<i64> = event
                .odds_change()
                .map(|oc| oc.players().collect())
                .unwrap_or_default();
            if !ctx.forward(event).await {
                break;
            }

            for player_id in players {
                let catalog = self.catalog.clone();
                let scheduled = pool.request(player_id, format!("player {player_id}"), move |lang| {
                    let catalog = catalog.clone();
                    async move {
                        let player = catalog.player(lang, player_id).await?;
                        Ok(Event::player(lang, player, received_at))
                    }
                });
                requested += usize::from(scheduled);
            }
        }
        debug!(requested, cached = pool.cache().len(), "player enricher done");
    }
}
