//! Feed Enricher Service - decodes the odds feed and enriches it with
//! reference data from the catalog.
//!
//! Architecture:
//! ```text
//! feed (ZMQ PUB) ──> decode ──> markets ──> fixture ──> player ──> competitor ──> file store ──> Redis
//!                                  └────────────┴──────────┴──────────┴──> catalog (HTTP)
//! ```

mod config;
mod sink;
mod source;

use crate::config::ServiceConfig;
use crate::sink::RedisSink;
use crate::source::ZmqSource;
use anyhow::{Context, Result};
use chrono::Utc;
use dotenv::dotenv;
use oddsfeed_core::clients::{CatalogConfig, HttpCatalog};
use oddsfeed_core::pipeline::enrich::{
    CompetitorEnricher, FixtureEnricher, MarketsEnricher, PlayerEnricher,
};
use oddsfeed_core::pipeline::store::{FileStore, StoreStage};
use oddsfeed_core::pipeline::{drain, run_source, ErrorRx, ErrorSink, Pipeline, Sink, Stats};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting feed enricher...");

    let config = ServiceConfig::from_env()?;
    let catalog = Arc::new(HttpCatalog::new(CatalogConfig::from_env()));
    info!(
        languages = ?config.pipeline.languages,
        concurrency = config.pipeline.concurrency,
        preload_hours = ?config.pipeline.preload_hours,
        "pipeline configured"
    );

    // Sinks
    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
    if let Some(url) = &config.redis_url {
        sinks.push(Box::new(RedisSink::connect(url, &config.redis_prefix).await?));
    }
    if sinks.is_empty() && config.store_root.is_none() {
        warn!("no output configured (STORE_ROOT, REDIS_URL), events are discarded");
    }

    // Source
    let mut source = ZmqSource::connect(&config.feed_endpoint, &config.feed_subscriptions).await?;

    // Pipeline
    let cancel = CancellationToken::new();
    let (errors, error_rx) = ErrorSink::channel();
    let stats = Arc::new(Stats::default());

    let mut fixtures = FixtureEnricher::new(catalog.clone(), config.pipeline.enrich_options());
    if let Some(hours) = config.pipeline.preload_hours {
        fixtures = fixtures.preload(Utc::now() + chrono::Duration::hours(hours));
    }
    let (input_tx, input_rx) = mpsc::channel(config.pipeline.buffer.max(1));
    let mut pipeline = Pipeline::new(errors.clone(), cancel.clone())
        .buffer(config.pipeline.buffer)
        .stage(MarketsEnricher::new(catalog.clone(), config.pipeline.enrich_options()))
        .stage(fixtures)
        .stage(PlayerEnricher::new(catalog.clone(), config.pipeline.enrich_options()))
        .stage(CompetitorEnricher::new(catalog, config.pipeline.enrich_options()));
    if let Some(root) = &config.store_root {
        info!(root = %root.display(), "archiving events to file store");
        pipeline = pipeline.stage(StoreStage::new(FileStore::new(root)));
    }
    let (output, stages) = pipeline.spawn(input_rx);

    let error_task = tokio::spawn(log_errors(error_rx));
    let stats_task = tokio::spawn(report_stats(
        stats.clone(),
        Duration::from_secs(config.stats_interval_secs.max(1)),
        cancel.clone(),
    ));

    let source_task = {
        let stats = stats.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let result = run_source(&mut source, input_tx, &errors, &cancel, &stats).await;
            if let Err(e) = &result {
                error!(error = %e, "feed source failed, shutting down");
                cancel.cancel();
            }
            result
        })
    };

    let drain_task = {
        let stats = stats.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let result = drain(output, &mut sinks, &stats).await;
            if let Err(e) = &result {
                error!(error = %e, "sink failed, shutting down");
                cancel.cancel();
            }
            result
        })
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("Received shutdown signal"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        },
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();

    let source_result = source_task.await.context("source task panicked")?;
    for stage in stages {
        if let Err(e) = stage.await {
            error!(error = %e, "pipeline stage panicked");
        }
    }
    let drain_result = drain_task.await.context("drain task panicked")?;
    let reported = error_task.await.unwrap_or_default();
    let _ = stats_task.await;

    let totals = stats.snapshot();
    info!(
        frames = totals.frames,
        decode_errors = totals.decode_errors,
        events_out = totals.events_out,
        reported_errors = reported,
        "Feed enricher stopped"
    );

    source_result.context("feed source failed")?;
    drain_result.context("event sink failed")?;
    Ok(())
}

/// Logs non-fatal pipeline errors until every reporter is gone.
async fn log_errors(mut errors: ErrorRx) -> u64 {
    let mut count = 0;
    while let Some(err) = errors.recv().await {
        count += 1;
        if err.is_not_found() {
            debug!(error = %err, "catalog entity not found");
        } else if err.is_decode() {
            warn!(error = %err, "dropped undecodable message");
        } else {
            warn!(error = %err, "pipeline error");
        }
    }
    count
}

async fn report_stats(stats: Arc<Stats>, every: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        let snapshot = stats.snapshot();
        info!(
            frames = snapshot.frames,
            decode_errors = snapshot.decode_errors,
            events_out = snapshot.events_out,
            "pipeline stats"
        );
    }
}
