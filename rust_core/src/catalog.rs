//! Reference-data lookups the enrichers depend on.
//!
//! Each enricher only needs its own slice of the catalog, so the lookups are
//! split into one trait per entity. [`HttpCatalog`](crate::clients::HttpCatalog)
//! implements all of them; tests substitute in-memory fakes.

use crate::error::CatalogError;
use crate::models::{Competitor, Fixture, FixtureTournament, Lang, MarketDescriptions, Player};
use crate::urn::Urn;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

#[async_trait]
pub trait PlayerCatalog: Send + Sync + 'static {
    async fn player(&self, lang: Lang, player_id: i64) -> Result<Player, CatalogError>;
}

#[async_trait]
pub trait CompetitorCatalog: Send + Sync + 'static {
    async fn competitor(&self, lang: Lang, competitor_id: i64) -> Result<Competitor, CatalogError>;
}

#[async_trait]
pub trait FixtureCatalog: Send + Sync + 'static {
    async fn fixture(&self, lang: Lang, event_urn: &Urn) -> Result<Fixture, CatalogError>;

    async fn tournament(&self, lang: Lang, urn: &Urn) -> Result<FixtureTournament, CatalogError>;

    /// Every fixture scheduled up to `before`, live events first. The stream
    /// ends after the first error.
    fn fixtures(
        &self,
        lang: Lang,
        before: DateTime<Utc>,
    ) -> BoxStream<'static, Result<Fixture, CatalogError>>;
}

#[async_trait]
pub trait MarketCatalog: Send + Sync + 'static {
    /// Full market description list.
    async fn markets(&self, lang: Lang) -> Result<MarketDescriptions, CatalogError>;

    async fn market_variant(
        &self,
        lang: Lang,
        market_id: i32,
        variant: &str,
    ) -> Result<MarketDescriptions, CatalogError>;
}

/// Everything the enrichment pipeline reads.
pub trait Catalog: PlayerCatalog + CompetitorCatalog + FixtureCatalog + MarketCatalog {}

impl<T> Catalog for T where T: PlayerCatalog + CompetitorCatalog + FixtureCatalog + MarketCatalog {}
