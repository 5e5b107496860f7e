//! Pipeline output.

use super::{EventRx, Stats};
use crate::error::FeedError;
use crate::message::Event;
use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait Sink: Send {
    /// Persists or publishes one event. Errors stop the drain.
    async fn consume(&mut self, event: &Event) -> Result<(), FeedError>;

    async fn flush(&mut self) -> Result<(), FeedError> {
        Ok(())
    }
}

/// Fans every event out to each sink in turn.
#[async_trait]
impl Sink for Vec<Box<dyn Sink>> {
    async fn consume(&mut self, event: &Event) -> Result<(), FeedError> {
        for sink in self.iter_mut() {
            sink.consume(event).await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), FeedError> {
        for sink in self.iter_mut() {
            sink.flush().await?;
        }
        Ok(())
    }
}

/// Feeds the pipeline output into `sink` until the output closes.
pub async fn drain<S>(mut input: EventRx, sink: &mut S, stats: &Stats) -> Result<(), FeedError>
where
    S: Sink + ?Sized,
{
    while let Some(event) = input.recv().await {
        sink.consume(&event).await?;
        Stats::incr(&stats.events_out);
    }
    debug!("pipeline output closed");
    sink.flush().await
}
