//! JSON archive of the event stream on the local filesystem.
//!
//! Layout under the root:
//!
//! ```text
//! log/events/<producer>/<event id>/<received at>[-<kind>].json
//! log/system/<kind>/<received at>.json
//! state/<lang>/players/<id>/<received at>.json
//! state/<lang>/competitors/<id>/<received at>.json
//! state/<lang>/fixtures/<event id>/<received at>.json
//! state/<lang>/tournaments/<event id>/<received at>.json
//! state/<lang>/markets/<all | id-variant id>/<received at>.json
//! ```
//!
//! `<producer>` is `sport` for the live and prematch producers and the
//! producer code otherwise.

use super::{Sink, Stage, StageContext};
use crate::error::FeedError;
use crate::message::{Event, MessageKind, Payload};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `event` is written, relative to the root.
    pub fn relative_path(event: &Event) -> PathBuf {
        let at = format!("{:013}", event.received_at);
        let kind = event.kind();
        let lang = event.lang.map_or("xx", |l| l.code());

        let path = match (&event.payload, kind.kind()) {
            (_, MessageKind::Event) => {
                let producer = match event.producer {
                    Some(p) if p.is_sports() => "sport",
                    Some(p) => p.code(),
                    None => "unknown",
                };
                let event_id = event.event_id.unwrap_or_default();
                let file = if matches!(event.payload, Payload::OddsChange(_)) {
                    at
                } else {
                    format!("{at}-{kind}")
                };
                format!("log/events/{producer}/{event_id}/{file}")
            }
            (_, MessageKind::System) => format!("log/system/{kind}/{at}"),
            (Payload::Player(p), _) => format!("state/{lang}/players/{}/{at}", p.id),
            (Payload::Competitor(c), _) => format!("state/{lang}/competitors/{}/{at}", c.id),
            (Payload::Markets(m), _) => {
                let entry = match m.0.as_slice() {
                    [single] => format!("{}-{}", single.id, single.variant_id.unwrap_or_default()),
                    _ => "all".to_string(),
                };
                format!("state/{lang}/markets/{entry}/{at}")
            }
            (Payload::Fixture(_), _) | (Payload::Tournament(_), _) => format!(
                "state/{lang}/{}s/{}/{at}",
                kind,
                event.event_id.unwrap_or_default()
            ),
            (_, MessageKind::Lexicon) => format!("state/{lang}/{kind}/{at}"),
        };
        PathBuf::from(format!("{path}.json"))
    }

    /// Writes one event, creating directories on demand. Returns the file
    /// written.
    pub async fn save(&self, event: &Event) -> Result<PathBuf, FeedError> {
        let path = self.root.join(Self::relative_path(event));
        let body = serde_json::to_vec_pretty(event).map_err(|e| FeedError::transport("encode event", e))?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| FeedError::transport("create store directory", e))?;
        }
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| FeedError::transport("write event file", e))?;
        debug!(path = %path.display(), kind = %event.kind(), "event stored");
        Ok(path)
    }
}

#[async_trait]
impl Sink for FileStore {
    async fn consume(&mut self, event: &Event) -> Result<(), FeedError> {
        self.save(event).await.map(|_| ())
    }
}

/// Pass-through stage that archives every event in the background. Write
/// failures are reported, never fatal.
#[derive(Debug, Clone)]
pub struct StoreStage {
    store: FileStore,
}

impl StoreStage {
    pub fn new(store: FileStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for StoreStage {
    fn name(&self) -> &'static str {
        "file_store"
    }

    async fn run(&mut self, ctx: &mut StageContext) {
        while let Some(event) = ctx.recv().await {
            let copy = event.clone();
            if !ctx.forward(event).await {
                break;
            }
            let store = self.store.clone();
            let errors = ctx.errors().clone();
            ctx.tasks().spawn(async move {
                if let Err(err) = store.save(&copy).await {
                    errors.report(err);
                }
            });
        }
    }
}
