//! Oddsfeed Core - odds feed decoding and reference-data enrichment.
//!
//! This crate provides:
//! - Identity normalization for markets, lines and outcomes
//! - Routing-key parsing and typed decoding of feed messages
//! - A staged pipeline runtime with ordered pass-through and background work
//! - Rate-limited, deduplicated catalog enrichers for players, competitors,
//!   fixtures and markets
//! - An HTTP catalog client guarded by a circuit breaker
//! - A JSON file archive for the event stream

pub mod cache;
pub mod catalog;
pub mod clients;
pub mod error;
pub mod identity;
pub mod message;
pub mod models;
pub mod pipeline;
pub mod rate_limit;
pub mod urn;

pub use cache::ExpireMap;
pub use catalog::{Catalog, CompetitorCatalog, FixtureCatalog, MarketCatalog, PlayerCatalog};
pub use error::{CatalogError, FeedError};
pub use message::{Event, MessageKind, MessageType, Payload, RoutingKey};
pub use models::{Lang, Producer};
pub use rate_limit::{RateLimiter, CONCURRENT_API_CALLS_LIMIT};
pub use urn::Urn;
