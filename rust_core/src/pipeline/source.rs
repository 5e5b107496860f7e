//! Feed ingestion: raw frames in, decoded events out.

use super::{ErrorSink, EventTx, Stats};
use crate::error::FeedError;
use crate::message::{now_millis, Event};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One message as delivered by the feed transport.
#[derive(Debug, Clone)]
pub struct Frame {
    pub routing_key: String,
    pub payload: Vec<u8>,
    /// Local receive time, epoch milliseconds.
    pub received_at: i64,
}

impl Frame {
    pub fn new(routing_key: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            routing_key: routing_key.into(),
            payload: payload.into(),
            received_at: now_millis(),
        }
    }
}

#[async_trait]
pub trait FeedSource: Send {
    /// Next frame, or `None` when the feed has ended. Errors are fatal.
    async fn next_frame(&mut self) -> Result<Option<Frame>, FeedError>;
}

/// Decodes frames into `output` until the source ends, the pipeline is
/// cancelled or nobody reads the output any more. Frames that fail to decode
/// are reported and skipped.
pub async fn run_source<S>(
    source: &mut S,
    output: EventTx,
    errors: &ErrorSink,
    cancel: &CancellationToken,
    stats: &Stats,
) -> Result<(), FeedError>
where
    S: FeedSource + ?Sized,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("source cancelled");
                break;
            }
            frame = source.next_frame() => frame?,
        };
        let Some(frame) = frame else {
            info!("feed source ended");
            break;
        };
        Stats::incr(&stats.frames);

        match Event::decode_at(&frame.routing_key, &frame.payload, frame.received_at) {
            Ok(event) => {
                if output.send(event).await.is_err() {
                    debug!("pipeline input closed, stopping source");
                    break;
                }
            }
            Err(err) => {
                Stats::incr(&stats.decode_errors);
                errors.report(err);
            }
        }
    }
    Ok(())
}
