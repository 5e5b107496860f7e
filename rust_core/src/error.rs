//! Pipeline and catalog error types.

use crate::message::MessageType;
use crate::models::Lang;
use thiserror::Error;

/// Failure talking to the reference-data catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog has no such entity. Never retried.
    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("catalog returned {status} for {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: quick_xml::DeError,
    },

    /// The client's circuit breaker is open.
    #[error("catalog unavailable: circuit breaker '{name}' open")]
    Unavailable { name: String },
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound { .. })
    }

    /// Worth another attempt after a short pause.
    pub fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Transport { .. } => true,
            CatalogError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Everything a stage can report on the shared error sink, plus the fatal
/// source and sink failures.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid routing key '{0}'")]
    InvalidRoutingKey(String),

    #[error("unknown message kind '{kind}' in routing key '{routing_key}'")]
    UnknownKind { kind: String, routing_key: String },

    #[error("failed to decode {kind} payload: {source}")]
    Decode {
        kind: MessageType,
        #[source]
        source: quick_xml::DeError,
    },

    #[error("{stage} enrichment of {entity} ({lang}) failed: {source}")]
    Catalog {
        stage: &'static str,
        lang: Lang,
        entity: String,
        #[source]
        source: CatalogError,
    },

    #[error("{op} failed: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl FeedError {
    pub fn transport<E>(op: &'static str, err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        FeedError::Transport { op, source: err.into() }
    }

    /// Catalog lookups of entities that do not exist; expected noise.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FeedError::Catalog { source, .. } if source.is_not_found())
    }

    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            FeedError::InvalidRoutingKey(_) | FeedError::UnknownKind { .. } | FeedError::Decode { .. }
        )
    }
}
