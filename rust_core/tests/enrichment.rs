//! End-to-end behaviour of the enrichment pipeline against an in-memory
//! catalog.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use oddsfeed_core::cache::ExpireMap;
use oddsfeed_core::models::{
    Competitor, Fixture, FixtureTournament, Lang, MarketDescription, MarketDescriptions, Player,
};
use oddsfeed_core::pipeline::enrich::{
    CompetitorEnricher, EnrichOptions, FixtureEnricher, MarketsEnricher, PlayerEnricher,
};
use oddsfeed_core::pipeline::store::FileStore;
use oddsfeed_core::pipeline::{
    drain, run_source, ErrorRx, ErrorSink, EventRx, FeedSource, Frame, Pipeline, Stats,
};
use oddsfeed_core::{
    CatalogError, CompetitorCatalog, Event, FeedError, FixtureCatalog, MarketCatalog,
    MessageType, Payload, PlayerCatalog, RateLimiter, Urn,
};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

const ODDS_CHANGE: &[u8] = include_bytes!("../testdata/odds_change-0.xml");
const PLAYER: &[u8] = include_bytes!("../testdata/player-0.xml");
const COMPETITOR: &[u8] = include_bytes!("../testdata/competitor-0.xml");
const FIXTURE: &[u8] = include_bytes!("../testdata/fixture-0.xml");
const TOURNAMENT: &[u8] = include_bytes!("../testdata/tournament-0.xml");

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Player(i64, Lang),
    Competitor(i64, Lang),
    Fixture(String, Lang),
    Tournament(String, Lang),
    Markets(Lang),
    Variant(i32, String, Lang),
    Schedule(Lang),
}

#[derive(Default)]
struct MockCatalog {
    calls: Mutex<Vec<Call>>,
    not_found: HashSet<i64>,
    failing: HashSet<i64>,
    schedule: Vec<Fixture>,
    /// Listings wait for a permit before yielding anything.
    schedule_gate: Option<Arc<Semaphore>>,
    /// Player lookups wait for a permit after being recorded.
    player_gate: Option<Arc<Semaphore>>,
}

impl MockCatalog {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn outcome(&self, id: i64) -> Result<(), CatalogError> {
        if self.not_found.contains(&id) {
            return Err(CatalogError::NotFound { url: format!("/{id}") });
        }
        if self.failing.contains(&id) {
            return Err(CatalogError::Status {
                url: format!("/{id}"),
                status: 503,
                body: String::new(),
            });
        }
        Ok(())
    }
}

fn decode<T>(kind: MessageType, body: &[u8], pick: impl Fn(Payload) -> Option<T>) -> T {
    pick(Payload::decode(kind, body).unwrap()).unwrap()
}

fn fixture(urn: &str) -> Fixture {
    let mut fixture = decode(MessageType::Fixture, FIXTURE, |p| match p {
        Payload::Fixture(f) => Some(f),
        _ => None,
    });
    fixture.urn = Urn::from(urn);
    fixture.id = fixture.urn.event_id();
    fixture
}

fn market(id: i32) -> MarketDescription {
    MarketDescription {
        id,
        name: format!("market {id}"),
        variant: None,
        variant_id: None,
        groups: Vec::new(),
        outcomes: Vec::new(),
        specifiers: Vec::new(),
    }
}

#[async_trait]
impl PlayerCatalog for MockCatalog {
    async fn player(&self, lang: Lang, player_id: i64) -> Result<Player, CatalogError> {
        self.record(Call::Player(player_id, lang));
        if let Some(gate) = &self.player_gate {
            let _permit = gate.acquire().await;
        }
        self.outcome(player_id)?;
        let mut player = decode(MessageType::Player, PLAYER, |p| match p {
            Payload::Player(p) => Some(p),
            _ => None,
        });
        player.id = player_id;
        Ok(player)
    }
}

#[async_trait]
impl CompetitorCatalog for MockCatalog {
    async fn competitor(&self, lang: Lang, competitor_id: i64) -> Result<Competitor, CatalogError> {
        self.record(Call::Competitor(competitor_id, lang));
        self.outcome(competitor_id)?;
        let mut competitor = decode(MessageType::Competitor, COMPETITOR, |p| match p {
            Payload::Competitor(c) => Some(c),
            _ => None,
        });
        competitor.id = competitor_id;
        Ok(competitor)
    }
}

#[async_trait]
impl FixtureCatalog for MockCatalog {
    async fn fixture(&self, lang: Lang, event_urn: &Urn) -> Result<Fixture, CatalogError> {
        self.record(Call::Fixture(event_urn.to_string(), lang));
        self.outcome(event_urn.event_id())?;
        Ok(fixture(event_urn.as_str()))
    }

    async fn tournament(&self, lang: Lang, urn: &Urn) -> Result<FixtureTournament, CatalogError> {
        self.record(Call::Tournament(urn.to_string(), lang));
        Ok(decode(MessageType::Tournament, TOURNAMENT, |p| match p {
            Payload::Tournament(t) => Some(t),
            _ => None,
        }))
    }

    fn fixtures(
        &self,
        lang: Lang,
        _before: DateTime<Utc>,
    ) -> BoxStream<'static, Result<Fixture, CatalogError>> {
        self.record(Call::Schedule(lang));
        let gate = self.schedule_gate.clone();
        let fixtures = self.schedule.clone();
        stream::once(async move {
            if let Some(gate) = gate {
                let _permit = gate.acquire().await;
            }
        })
        .flat_map(move |_| stream::iter(fixtures.clone().into_iter().map(Ok)))
        .boxed()
    }
}

#[async_trait]
impl MarketCatalog for MockCatalog {
    async fn markets(&self, lang: Lang) -> Result<MarketDescriptions, CatalogError> {
        self.record(Call::Markets(lang));
        Ok(MarketDescriptions(vec![market(1), market(18)]))
    }

    async fn market_variant(
        &self,
        lang: Lang,
        market_id: i32,
        variant: &str,
    ) -> Result<MarketDescriptions, CatalogError> {
        self.record(Call::Variant(market_id, variant.to_string(), lang));
        Ok(MarketDescriptions(vec![market(market_id)]))
    }
}

fn options(languages: &[Lang], capacity: usize) -> EnrichOptions {
    EnrichOptions::new(languages.to_vec(), RateLimiter::new(capacity))
}

fn odds_change(event_id: i64, received_at: i64) -> Event {
    let key = format!("hi.pre.-.odds_change.1.sr:match.{event_id}.-");
    Event::decode_at(&key, ODDS_CHANGE, received_at).unwrap()
}

fn fixture_change(urn: &str, received_at: i64) -> Event {
    let (urn_type, id) = urn.rsplit_once(':').unwrap();
    let key = format!("hi.pre.-.fixture_change.1.{urn_type}.{id}.-");
    let body = format!(r#"<fixture_change event_id="{urn}" product="3" timestamp="1"/>"#);
    Event::decode_at(&key, body.as_bytes(), received_at).unwrap()
}

async fn collect(mut rx: EventRx) -> Vec<Event> {
    tokio::time::timeout(Duration::from_secs(5), async move {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    })
    .await
    .expect("pipeline did not close its output")
}

fn primary(events: &[Event]) -> Vec<i64> {
    events
        .iter()
        .filter(|e| e.lang.is_none())
        .map(|e| e.received_at)
        .collect()
}

fn drain_errors(rx: &mut ErrorRx) -> Vec<FeedError> {
    let mut errors = Vec::new();
    while let Ok(err) = rx.try_recv() {
        errors.push(err);
    }
    errors
}

#[tokio::test]
async fn test_one_player_lookup_per_language() {
    let catalog = Arc::new(MockCatalog::default());
    let (errors, mut error_rx) = ErrorSink::channel();
    let (tx, rx) = mpsc::channel(16);
    let (out, _) = Pipeline::new(errors, CancellationToken::new())
        .stage(PlayerEnricher::new(catalog.clone(), options(&[Lang::En, Lang::De], 4)))
        .spawn(rx);

    tx.send(odds_change(1234, 1)).await.unwrap();
    tx.send(odds_change(1234, 2)).await.unwrap();
    drop(tx);
    let events = collect(out).await;

    assert_eq!(primary(&events), vec![1, 2]);
    let mut calls = catalog.calls();
    calls.sort_by_key(|c| format!("{c:?}"));
    assert_eq!(
        calls,
        vec![
            Call::Player(1234, Lang::De),
            Call::Player(1234, Lang::En),
            Call::Player(4322, Lang::De),
            Call::Player(4322, Lang::En),
        ]
    );

    let players: Vec<&Event> = events.iter().filter(|e| e.is(MessageType::Player)).collect();
    assert_eq!(players.len(), 4);
    assert!(players.iter().all(|e| e.received_at == 1 && e.lang.is_some()));
    assert!(drain_errors(&mut error_rx).is_empty());
}

#[tokio::test]
async fn test_fresh_players_not_fetched() {
    let catalog = Arc::new(MockCatalog::default());
    let cache = Arc::new(ExpireMap::new(Duration::from_secs(3600)));
    cache.insert(1234);

    let (errors, _error_rx) = ErrorSink::channel();
    let (tx, rx) = mpsc::channel(16);
    let enricher =
        PlayerEnricher::with_cache(catalog.clone(), options(&[Lang::En, Lang::De], 4), cache);
    let (out, _) = Pipeline::new(errors, CancellationToken::new())
        .stage(enricher)
        .spawn(rx);

    tx.send(odds_change(1234, 1)).await.unwrap();
    drop(tx);
    collect(out).await;

    assert_eq!(catalog.count(|c| matches!(c, Call::Player(1234, _))), 0);
    assert_eq!(catalog.count(|c| matches!(c, Call::Player(4322, _))), 2);
}

#[tokio::test]
async fn test_not_found_suppressed_transient_retried() {
    let catalog = Arc::new(MockCatalog {
        not_found: HashSet::from([1234]),
        failing: HashSet::from([4322]),
        ..MockCatalog::default()
    });
    let (errors, mut error_rx) = ErrorSink::channel();
    let (tx, rx) = mpsc::channel(16);
    let (out, _) = Pipeline::new(errors, CancellationToken::new())
        .stage(PlayerEnricher::new(catalog.clone(), options(&[Lang::En, Lang::De], 4)))
        .spawn(rx);

    tx.send(odds_change(1234, 1)).await.unwrap();
    let mut first = Vec::new();
    for _ in 0..4 {
        first.push(error_rx.recv().await.unwrap());
    }
    assert_eq!(first.iter().filter(|e| e.is_not_found()).count(), 2);

    tx.send(odds_change(1234, 2)).await.unwrap();
    drop(tx);
    let events = collect(out).await;

    assert_eq!(primary(&events), vec![1, 2]);
    assert_eq!(catalog.count(|c| matches!(c, Call::Player(1234, _))), 2);
    assert_eq!(catalog.count(|c| matches!(c, Call::Player(4322, _))), 4);
    let second = drain_errors(&mut error_rx);
    assert_eq!(second.len(), 2);
    assert!(second.iter().all(|e| !e.is_not_found()));
}

#[tokio::test]
async fn test_markets_bulk_load_and_variants() {
    let catalog = Arc::new(MockCatalog::default());
    let (errors, _error_rx) = ErrorSink::channel();
    let (tx, rx) = mpsc::channel(16);
    let (out, _) = Pipeline::new(errors, CancellationToken::new())
        .stage(MarketsEnricher::new(catalog.clone(), options(&[Lang::En, Lang::De], 4)))
        .spawn(rx);

    let body = r#"<odds_change product="1" event_id="sr:match:5" timestamp="1">
        <odds>
          <market id="145" specifiers="variant=sr:point_range:6+"/>
          <market id="679" specifiers="variant=pre:playerprops:35432179:608000"/>
          <market id="145" specifiers="variant=sr:point_range:6+|total=1.5"/>
        </odds>
      </odds_change>"#;
    let event = Event::decode_at("hi.pre.-.odds_change.1.sr:match.5.-", body.as_bytes(), 7).unwrap();
    tx.send(event).await.unwrap();
    drop(tx);
    let events = collect(out).await;

    assert_eq!(catalog.count(|c| matches!(c, Call::Markets(_))), 2);
    assert_eq!(
        catalog.count(|c| matches!(c, Call::Variant(145, v, _) if v == "sr:point_range:6+")),
        2
    );
    assert_eq!(catalog.count(|c| matches!(c, Call::Variant(679, _, _))), 0);

    let markets: Vec<&Event> = events.iter().filter(|e| e.is(MessageType::Markets)).collect();
    assert_eq!(markets.len(), 4);
    assert_eq!(markets.iter().filter(|e| e.received_at == 7).count(), 2);
}

#[tokio::test]
async fn test_fixture_lookups_held_back_during_preload() {
    let gate = Arc::new(Semaphore::new(0));
    let catalog = Arc::new(MockCatalog {
        schedule: vec![fixture("sr:match:1")],
        schedule_gate: Some(gate.clone()),
        ..MockCatalog::default()
    });
    let enricher = FixtureEnricher::new(catalog.clone(), options(&[Lang::En, Lang::De], 4))
        .preload(Utc::now() + chrono::Duration::hours(24));
    let (errors, _error_rx) = ErrorSink::channel();
    let (tx, rx) = mpsc::channel(16);
    let (mut out, _) = Pipeline::new(errors, CancellationToken::new())
        .stage(enricher)
        .spawn(rx);

    tx.send(fixture_change("sr:match:1", 1)).await.unwrap();
    tx.send(fixture_change("sr:match:2", 2)).await.unwrap();
    tx.send(odds_change(9, 3)).await.unwrap();
    tx.send(fixture_change("test:match:3", 4)).await.unwrap();
    tx.send(fixture_change("sr:simple_tournament:1030", 5)).await.unwrap();
    tx.send(fixture_change("sr:match:2", 6)).await.unwrap();

    // forwarded in order while the listing is still blocked
    for expected in 1..=6 {
        let event = tokio::time::timeout(Duration::from_secs(1), out.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.received_at, expected);
    }
    assert_eq!(catalog.count(|c| matches!(c, Call::Fixture(..))), 0);
    assert_eq!(catalog.count(|c| matches!(c, Call::Tournament(..))), 0);

    gate.add_permits(10);
    drop(tx);
    let events = collect(out).await;

    assert_eq!(catalog.count(|c| matches!(c, Call::Schedule(_))), 2);
    assert_eq!(catalog.count(|c| matches!(c, Call::Fixture(u, _) if u == "sr:match:1")), 0);
    assert_eq!(catalog.count(|c| matches!(c, Call::Fixture(u, _) if u == "sr:match:2")), 2);
    assert_eq!(catalog.count(|c| matches!(c, Call::Fixture(u, _) if u.starts_with("test:"))), 0);
    assert_eq!(catalog.count(|c| matches!(c, Call::Tournament(..))), 2);

    let fixtures = events.iter().filter(|e| e.is(MessageType::Fixture)).count();
    // preloaded sr:match:1 and fetched sr:match:2, both languages
    assert_eq!(fixtures, 4);
    assert_eq!(events.iter().filter(|e| e.is(MessageType::Tournament)).count(), 2);
}

#[tokio::test]
async fn test_primary_order_survives_full_chain() {
    let catalog = Arc::new(MockCatalog::default());
    let langs = [Lang::En, Lang::De];
    let (errors, _error_rx) = ErrorSink::channel();
    let (tx, rx) = mpsc::channel(4);
    let (out, handles) = Pipeline::new(errors, CancellationToken::new())
        .buffer(2)
        .stage(MarketsEnricher::new(catalog.clone(), options(&langs, 2)))
        .stage(FixtureEnricher::new(catalog.clone(), options(&langs, 2)))
        .stage(PlayerEnricher::new(catalog.clone(), options(&langs, 2)))
        .stage(CompetitorEnricher::new(catalog.clone(), options(&langs, 2)))
        .spawn(rx);

    let feeder = tokio::spawn(async move {
        for n in 0..40 {
            let event = if n % 3 == 0 {
                fixture_change(&format!("sr:match:{n}"), n)
            } else {
                odds_change(n, n)
            };
            tx.send(event).await.unwrap();
        }
    });

    let events = collect(out).await;
    feeder.await.unwrap();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(primary(&events), (0..40).collect::<Vec<_>>());
    assert_eq!(events.iter().filter(|e| e.is(MessageType::Competitor)).count(), 6);
    assert_eq!(events.iter().filter(|e| e.is(MessageType::Player)).count(), 4);
    assert_eq!(catalog.count(|c| matches!(c, Call::Fixture(..))), 2 * 14);
}

#[tokio::test]
async fn test_cancel_lets_in_flight_fetch_finish() {
    let gate = Arc::new(Semaphore::new(0));
    let catalog = Arc::new(MockCatalog {
        player_gate: Some(gate.clone()),
        ..MockCatalog::default()
    });
    let cache = Arc::new(ExpireMap::new(Duration::from_secs(3600)));
    let cancel = CancellationToken::new();
    let (errors, _error_rx) = ErrorSink::channel();
    let (tx, rx) = mpsc::channel(16);
    let enricher = PlayerEnricher::with_cache(catalog.clone(), options(&[Lang::En], 1), cache.clone());
    let (out, _) = Pipeline::new(errors, cancel.clone()).stage(enricher).spawn(rx);

    tx.send(odds_change(1234, 1)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), async {
        while catalog.calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    gate.add_permits(10);
    let events = collect(out).await;

    assert_eq!(catalog.calls(), vec![Call::Player(1234, Lang::En)]);
    assert_eq!(primary(&events), vec![1]);
    assert_eq!(events.iter().filter(|e| e.is(MessageType::Player)).count(), 1);
    assert!(cache.fresh(1234));
    assert!(!cache.fresh(4322));
    drop(tx);
}

async fn wait_for_calls(catalog: &MockCatalog, pred: impl Fn(&Call) -> bool, n: usize) -> bool {
    tokio::time::timeout(Duration::from_secs(1), async {
        while catalog.count(&pred) < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .is_ok()
}

#[tokio::test]
async fn test_saturated_enricher_does_not_block_another() {
    let gate = Arc::new(Semaphore::new(0));
    let catalog = Arc::new(MockCatalog {
        player_gate: Some(gate.clone()),
        ..MockCatalog::default()
    });
    let (errors, _error_rx) = ErrorSink::channel();
    let (tx, rx) = mpsc::channel(16);
    let (out, _) = Pipeline::new(errors, CancellationToken::new())
        .stage(PlayerEnricher::new(catalog.clone(), options(&[Lang::En], 2)))
        .stage(CompetitorEnricher::new(catalog.clone(), options(&[Lang::En], 2)))
        .spawn(rx);

    tx.send(odds_change(1234, 1)).await.unwrap();
    assert!(wait_for_calls(&catalog, |c| matches!(c, Call::Player(..)), 2).await);
    // both player lookups are parked on the gate, holding every player slot
    assert!(wait_for_calls(&catalog, |c| matches!(c, Call::Competitor(..)), 3).await);

    gate.add_permits(10);
    drop(tx);
    let events = collect(out).await;
    assert_eq!(events.iter().filter(|e| e.is(MessageType::Player)).count(), 2);
    assert_eq!(events.iter().filter(|e| e.is(MessageType::Competitor)).count(), 3);
}

#[tokio::test]
async fn test_preload_listing_holds_no_limiter_slot() {
    let gate = Arc::new(Semaphore::new(0));
    let catalog = Arc::new(MockCatalog {
        schedule: vec![fixture("sr:match:1")],
        schedule_gate: Some(gate.clone()),
        ..MockCatalog::default()
    });
    // one limiter between the two stages, with a single slot
    let shared = options(&[Lang::En], 1);
    let fixtures = FixtureEnricher::new(catalog.clone(), shared.clone())
        .preload(Utc::now() + chrono::Duration::hours(24));
    let (errors, _error_rx) = ErrorSink::channel();
    let (tx, rx) = mpsc::channel(16);
    let (out, _) = Pipeline::new(errors, CancellationToken::new())
        .stage(fixtures)
        .stage(PlayerEnricher::new(catalog.clone(), shared))
        .spawn(rx);

    tx.send(odds_change(1234, 1)).await.unwrap();
    assert!(wait_for_calls(&catalog, |c| matches!(c, Call::Schedule(_)), 1).await);
    assert!(wait_for_calls(&catalog, |c| matches!(c, Call::Player(..)), 2).await);

    gate.add_permits(10);
    drop(tx);
    let events = collect(out).await;
    assert_eq!(events.iter().filter(|e| e.is(MessageType::Fixture)).count(), 1);
    assert_eq!(events.iter().filter(|e| e.is(MessageType::Player)).count(), 2);
}

struct Replay(VecDeque<Frame>);

#[async_trait]
impl FeedSource for Replay {
    async fn next_frame(&mut self) -> Result<Option<Frame>, FeedError> {
        Ok(self.0.pop_front())
    }
}

#[tokio::test]
async fn test_feed_to_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(MockCatalog::default());
    let cancel = CancellationToken::new();
    let (errors, mut error_rx) = ErrorSink::channel();
    let stats = Stats::default();

    let mut source = Replay(VecDeque::from(vec![
        Frame {
            routing_key: "hi.pre.-.odds_change.1.sr:match.1234.-".to_string(),
            payload: ODDS_CHANGE.to_vec(),
            received_at: 1_000,
        },
        Frame {
            routing_key: "hi.pre.-.odds_changes.1.sr:match.1234.-".to_string(),
            payload: ODDS_CHANGE.to_vec(),
            received_at: 1_001,
        },
    ]));

    let (tx, rx) = mpsc::channel(16);
    let (out, _) = Pipeline::new(errors.clone(), cancel.clone())
        .stage(PlayerEnricher::new(catalog, options(&[Lang::En], 2)))
        .spawn(rx);

    run_source(&mut source, tx, &errors, &cancel, &stats).await.unwrap();
    drop(errors);
    let mut store = FileStore::new(dir.path());
    drain(out, &mut store, &stats).await.unwrap();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.frames, 2);
    assert_eq!(snapshot.decode_errors, 1);
    assert_eq!(snapshot.events_out, 3);

    assert!(dir.path().join("log/events/sport/1234/0000000001000.json").exists());
    let players = std::fs::read_dir(dir.path().join("state/en/players")).unwrap().count();
    assert_eq!(players, 2);

    let reported = drain_errors(&mut error_rx);
    assert_eq!(reported.len(), 1);
    assert!(matches!(reported[0], FeedError::UnknownKind { .. }));
}
