//! Stage runtime.
//!
//! A pipeline is a chain of stages joined by bounded channels. Every stage
//! owns its input receiver and the sender of its output; it forwards each
//! input event before acting on it and may emit extra events from background
//! tasks. A stage's output closes only after its `run` has returned and every
//! task it spawned has finished, so closure propagates down the chain once the
//! upstream end is gone. Non-fatal failures go to one shared [`ErrorSink`].

pub mod enrich;
mod sink;
mod source;
pub mod store;

pub use sink::{drain, Sink};
pub use source::{run_source, FeedSource, Frame};

use crate::error::FeedError;
use crate::message::Event;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

pub type EventTx = mpsc::Sender<Event>;
pub type EventRx = mpsc::Receiver<Event>;
pub type ErrorRx = mpsc::UnboundedReceiver<FeedError>;

/// Capacity of the channel between two stages.
pub const DEFAULT_BUFFER: usize = 1024;

/// Shared destination for non-fatal errors. Reporting never blocks.
#[derive(Debug, Clone)]
pub struct ErrorSink {
    tx: mpsc::UnboundedSender<FeedError>,
}

impl ErrorSink {
    pub fn channel() -> (Self, ErrorRx) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, err: FeedError) {
        if let Err(mpsc::error::SendError(err)) = self.tx.send(err) {
            debug!(error = %err, "error sink closed, dropping error");
        }
    }
}

/// Counters logged periodically by the service.
#[derive(Debug, Default)]
pub struct Stats {
    pub frames: AtomicU64,
    pub decode_errors: AtomicU64,
    pub events_out: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub decode_errors: u64,
    pub events_out: u64,
}

impl Stats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            events_out: self.events_out.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// What a stage sees while it runs.
pub struct StageContext {
    input: EventRx,
    output: EventTx,
    errors: ErrorSink,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl StageContext {
    /// Next input event. `None` once the input is closed or the pipeline has
    /// been cancelled; events still queued at cancellation are not delivered.
    pub async fn recv(&mut self) -> Option<Event> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.input.recv() => event,
        }
    }

    /// Sends an event downstream. `false` when the downstream stage is gone.
    pub async fn forward(&self, event: Event) -> bool {
        self.output.send(event).await.is_ok()
    }

    pub fn output(&self) -> EventTx {
        self.output.clone()
    }

    pub fn errors(&self) -> &ErrorSink {
        &self.errors
    }

    /// Background tasks spawned here hold the output open until they finish.
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[async_trait]
pub trait Stage: Send + 'static {
    fn name(&self) -> &'static str;

    /// Consumes the context's input until it returns `None`.
    async fn run(&mut self, ctx: &mut StageContext);
}

/// Runs one stage on its own task and returns the receiving end of its output.
pub fn spawn_stage<S: Stage>(
    stage: S,
    input: EventRx,
    errors: ErrorSink,
    cancel: CancellationToken,
    buffer: usize,
) -> (EventRx, JoinHandle<()>) {
    spawn_boxed(Box::new(stage), input, errors, cancel, buffer)
}

fn spawn_boxed(
    mut stage: Box<dyn Stage>,
    input: EventRx,
    errors: ErrorSink,
    cancel: CancellationToken,
    buffer: usize,
) -> (EventRx, JoinHandle<()>) {
    let (output, rx) = mpsc::channel(buffer.max(1));
    let handle = tokio::spawn(async move {
        let name = stage.name();
        let mut ctx = StageContext {
            input,
            output,
            errors,
            tasks: TaskTracker::new(),
            cancel,
        };
        debug!(stage = name, "stage started");
        stage.run(&mut ctx).await;

        let StageContext {
            input,
            output,
            tasks,
            ..
        } = ctx;
        drop(input);
        tasks.close();
        if !tasks.is_empty() {
            debug!(stage = name, pending = tasks.len(), "waiting for stage tasks");
        }
        tasks.wait().await;
        drop(output);
        info!(stage = name, "stage stopped");
    });
    (rx, handle)
}

/// Builder chaining stages in order.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    errors: ErrorSink,
    cancel: CancellationToken,
    buffer: usize,
}

impl Pipeline {
    pub fn new(errors: ErrorSink, cancel: CancellationToken) -> Self {
        Self {
            stages: Vec::new(),
            errors,
            cancel,
            buffer: DEFAULT_BUFFER,
        }
    }

    pub fn buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn stage<S: Stage>(mut self, stage: S) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Spawns every stage. The returned receiver yields the last stage's
    /// output and closes after all stages have stopped.
    pub fn spawn(self, input: EventRx) -> (EventRx, Vec<JoinHandle<()>>) {
        let mut rx = input;
        let mut handles = Vec::with_capacity(self.stages.len());
        for stage in self.stages {
            let (next, handle) = spawn_boxed(
                stage,
                rx,
                self.errors.clone(),
                self.cancel.clone(),
                self.buffer,
            );
            rx = next;
            handles.push(handle);
        }
        (rx, handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Event;
    use std::time::Duration;

    const ODDS_CHANGE: &[u8] = include_bytes!("../../testdata/odds_change-0.xml");

    fn event(n: i64) -> Event {
        Event::decode_at("hi.pre.-.odds_change.1.sr:match.1234.-", ODDS_CHANGE, n).unwrap()
    }

    /// Forwards everything and emits a delayed copy of each event from a
    /// background task.
    struct Echo;

    #[async_trait]
    impl Stage for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn run(&mut self, ctx: &mut StageContext) {
            while let Some(event) = ctx.recv().await {
                let out = ctx.output();
                let mut copy = event.clone();
                copy.received_at += 1000;
                if !ctx.forward(event).await {
                    break;
                }
                ctx.tasks().spawn(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let _ = out.send(copy).await;
                });
            }
        }
    }

    struct PassThrough;

    #[async_trait]
    impl Stage for PassThrough {
        fn name(&self) -> &'static str {
            "pass"
        }

        async fn run(&mut self, ctx: &mut StageContext) {
            while let Some(event) = ctx.recv().await {
                if !ctx.forward(event).await {
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_pass_through_preserves_order() {
        let (errors, _error_rx) = ErrorSink::channel();
        let (tx, rx) = mpsc::channel(4);
        let (mut out, _) = Pipeline::new(errors, CancellationToken::new())
            .buffer(2)
            .stage(PassThrough)
            .stage(PassThrough)
            .spawn(rx);

        tokio::spawn(async move {
            for n in 0..50 {
                tx.send(event(n)).await.unwrap();
            }
        });

        let mut seen = Vec::new();
        while let Some(event) = out.recv().await {
            seen.push(event.received_at);
        }
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_output_waits_for_background_tasks() {
        let (errors, _error_rx) = ErrorSink::channel();
        let (tx, rx) = mpsc::channel(4);
        let (mut out, handles) = Pipeline::new(errors, CancellationToken::new())
            .stage(Echo)
            .stage(PassThrough)
            .spawn(rx);

        tx.send(event(1)).await.unwrap();
        tx.send(event(2)).await.unwrap();
        drop(tx);

        let mut seen = Vec::new();
        while let Some(event) = out.recv().await {
            seen.push(event.received_at);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 1001, 1002]);
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_cancel_closes_chain() {
        let (errors, _error_rx) = ErrorSink::channel();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(4);
        let (mut out, _) = Pipeline::new(errors, cancel.clone())
            .stage(PassThrough)
            .spawn(rx);

        tx.send(event(1)).await.unwrap();
        assert_eq!(out.recv().await.map(|e| e.received_at), Some(1));

        cancel.cancel();
        let closed = tokio::time::timeout(Duration::from_secs(1), out.recv()).await;
        assert!(matches!(closed, Ok(None)));
        drop(tx);
    }

    #[tokio::test]
    async fn test_error_sink_never_blocks() {
        let (errors, mut rx) = ErrorSink::channel();
        for _ in 0..1000 {
            errors.report(FeedError::InvalidRoutingKey("x".to_string()));
        }
        drop(errors);
        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 1000);
    }
}
