//! ZeroMQ feed subscriber.

use anyhow::{Context, Result};
use async_trait::async_trait;
use oddsfeed_core::pipeline::{FeedSource, Frame};
use oddsfeed_core::FeedError;
use tracing::{debug, info};
use zeromq::{Socket, SocketRecv, SubSocket};

/// Reads multipart `[routing key, payload]` messages from a SUB socket.
pub struct ZmqSource {
    socket: SubSocket,
}

impl ZmqSource {
    pub async fn connect(endpoint: &str, subscriptions: &[String]) -> Result<Self> {
        let mut socket = SubSocket::new();
        socket
            .connect(endpoint)
            .await
            .with_context(|| format!("failed to connect to feed at {endpoint}"))?;

        if subscriptions.is_empty() {
            socket.subscribe("").await.context("failed to subscribe to feed")?;
        }
        for topic in subscriptions {
            socket
                .subscribe(topic)
                .await
                .with_context(|| format!("failed to subscribe to '{topic}'"))?;
        }
        info!(endpoint, topics = ?subscriptions, "connected to feed");
        Ok(Self { socket })
    }
}

#[async_trait]
impl FeedSource for ZmqSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>, FeedError> {
        loop {
            let msg = self
                .socket
                .recv()
                .await
                .map_err(|e| FeedError::transport("zmq recv", e))?;
            let parts: Vec<_> = msg.iter().collect();
            if parts.len() < 2 {
                debug!(parts = parts.len(), "skipping message without payload frame");
                continue;
            }
            let routing_key = String::from_utf8_lossy(parts[0].as_ref()).into_owned();
            return Ok(Some(Frame::new(routing_key, parts[1].to_vec())));
        }
    }
}
