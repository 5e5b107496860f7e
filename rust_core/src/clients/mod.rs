//! Outbound service clients.

pub mod breaker;
pub mod catalog;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use catalog::{CatalogConfig, HttpCatalog};
