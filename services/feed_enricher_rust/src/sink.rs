//! Redis publisher for enriched events.

use anyhow::{Context, Result};
use async_trait::async_trait;
use oddsfeed_core::pipeline::Sink;
use oddsfeed_core::{Event, FeedError};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

/// Publishes each event as JSON to `<prefix>.<kind>`.
pub struct RedisSink {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisSink {
    pub async fn connect(url: &str, prefix: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid REDIS_URL")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("failed to connect to Redis")?;
        info!(prefix, "publishing events to Redis");
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }
}

pub fn channel(prefix: &str, event: &Event) -> String {
    format!("{prefix}.{}", event.kind())
}

#[async_trait]
impl Sink for RedisSink {
    async fn consume(&mut self, event: &Event) -> Result<(), FeedError> {
        let payload = serde_json::to_string(event).map_err(|e| FeedError::transport("encode event", e))?;
        self.conn
            .publish::<_, _, ()>(channel(&self.prefix, event), payload)
            .await
            .map_err(|e| FeedError::transport("redis publish", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_per_kind() {
        let alive = Event::decode(
            "-.-.-.alive.-.-.-.-",
            br#"<alive product="1" timestamp="1" subscribed="1"/>"#,
        )
        .unwrap();
        assert_eq!(channel("oddsfeed", &alive), "oddsfeed.alive");
    }
}
