//! Message envelope: routing-key parsing, payload decoding and the JSON event
//! document every stage passes along.

use crate::error::FeedError;
use crate::models::catalog::{
    decode_competitor, decode_fixture, decode_markets, decode_player, decode_tournament,
};
use crate::models::feed::{AliveXml, BetStopXml, FixtureChangeXml, SnapshotCompleteXml};
use crate::models::odds_change::OddsChangeXml;
use crate::models::settlement::{BetSettlementXml, CancelXml};
use crate::models::{
    from_xml, Alive, BetCancel, BetSettlement, BetStop, Competitor, Fixture, FixtureChange,
    FixtureTournament, Lang, MarketDescriptions, OddsChange, Player, Producer, RollbackBetCancel,
    RollbackBetSettlement, SnapshotComplete,
};
use crate::urn::Urn;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

const ROUTING_KEY_TOKENS: usize = 8;
const ABSENT: &str = "-";

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Alive,
    SnapshotComplete,
    OddsChange,
    FixtureChange,
    BetCancel,
    RollbackBetCancel,
    BetSettlement,
    RollbackBetSettlement,
    BetStop,
    Player,
    Competitor,
    Fixture,
    Tournament,
    Markets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Producer housekeeping.
    System,
    /// Per sport event.
    Event,
    /// Reference data produced by the enrichers.
    Lexicon,
}

impl MessageType {
    /// Kinds the feed delivers. Exact token match only.
    pub fn from_routing_token(token: &str) -> Option<Self> {
        let kind = match token {
            "alive" => Self::Alive,
            "snapshot_complete" => Self::SnapshotComplete,
            "odds_change" => Self::OddsChange,
            "fixture_change" => Self::FixtureChange,
            "bet_cancel" => Self::BetCancel,
            "rollback_bet_cancel" => Self::RollbackBetCancel,
            "bet_settlement" => Self::BetSettlement,
            "rollback_bet_settlement" => Self::RollbackBetSettlement,
            "bet_stop" => Self::BetStop,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alive => "alive",
            Self::SnapshotComplete => "snapshot_complete",
            Self::OddsChange => "odds_change",
            Self::FixtureChange => "fixture_change",
            Self::BetCancel => "bet_cancel",
            Self::RollbackBetCancel => "rollback_bet_cancel",
            Self::BetSettlement => "bet_settlement",
            Self::RollbackBetSettlement => "rollback_bet_settlement",
            Self::BetStop => "bet_stop",
            Self::Player => "player",
            Self::Competitor => "competitor",
            Self::Fixture => "fixture",
            Self::Tournament => "tournament",
            Self::Markets => "markets",
        }
    }

    pub fn kind(self) -> MessageKind {
        match self {
            Self::Alive | Self::SnapshotComplete => MessageKind::System,
            Self::Player | Self::Competitor | Self::Fixture | Self::Tournament | Self::Markets => {
                MessageKind::Lexicon
            }
            _ => MessageKind::Event,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `priority.prematch_interest.live_interest.kind.sport_id.urn_type.event_id.node_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingKey {
    pub priority: String,
    pub kind: MessageType,
    pub sport_id: Option<i32>,
    pub event_urn: Option<Urn>,
    pub node_id: Option<String>,
}

fn token(t: &str) -> Option<&str> {
    (t != ABSENT && !t.is_empty()).then_some(t)
}

impl RoutingKey {
    pub fn parse(key: &str) -> Result<Self, FeedError> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() != ROUTING_KEY_TOKENS {
            return Err(FeedError::InvalidRoutingKey(key.to_string()));
        }
        let kind = MessageType::from_routing_token(parts[3]).ok_or_else(|| FeedError::UnknownKind {
            kind: parts[3].to_string(),
            routing_key: key.to_string(),
        })?;
        let sport_id = match token(parts[4]) {
            Some(id) => Some(
                id.parse()
                    .map_err(|_| FeedError::InvalidRoutingKey(key.to_string()))?,
            ),
            None => None,
        };
        let event_urn = match (token(parts[5]), token(parts[6])) {
            (Some(urn_type), Some(id)) => Some(Urn::new(format!("{urn_type}:{id}"))),
            _ => None,
        };
        Ok(RoutingKey {
            priority: parts[0].to_string(),
            kind,
            sport_id,
            event_urn,
            node_id: token(parts[7]).map(str::to_string),
        })
    }
}

/// Typed content of an event; the variant is the event's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Payload {
    Alive(Alive),
    SnapshotComplete(SnapshotComplete),
    OddsChange(OddsChange),
    FixtureChange(FixtureChange),
    BetCancel(BetCancel),
    RollbackBetCancel(RollbackBetCancel),
    BetSettlement(BetSettlement),
    RollbackBetSettlement(RollbackBetSettlement),
    BetStop(BetStop),
    Player(Player),
    Competitor(Competitor),
    Fixture(Fixture),
    Tournament(FixtureTournament),
    Markets(MarketDescriptions),
}

impl Payload {
    /// Decodes a feed or catalog XML document of the given kind.
    pub fn decode(kind: MessageType, body: &[u8]) -> Result<Self, FeedError> {
        let decode_err = |source| FeedError::Decode { kind, source };
        let payload = match kind {
            MessageType::Alive => Payload::Alive(from_xml::<AliveXml>(body).map_err(decode_err)?.into()),
            MessageType::SnapshotComplete => Payload::SnapshotComplete(
                from_xml::<SnapshotCompleteXml>(body).map_err(decode_err)?.into(),
            ),
            MessageType::OddsChange => {
                Payload::OddsChange(from_xml::<OddsChangeXml>(body).map_err(decode_err)?.into())
            }
            MessageType::FixtureChange => Payload::FixtureChange(
                from_xml::<FixtureChangeXml>(body).map_err(decode_err)?.into(),
            ),
            MessageType::BetCancel => {
                Payload::BetCancel(from_xml::<CancelXml>(body).map_err(decode_err)?.into())
            }
            MessageType::RollbackBetCancel => {
                Payload::RollbackBetCancel(from_xml::<CancelXml>(body).map_err(decode_err)?.into())
            }
            MessageType::BetSettlement => Payload::BetSettlement(
                from_xml::<BetSettlementXml>(body).map_err(decode_err)?.into(),
            ),
            MessageType::RollbackBetSettlement => Payload::RollbackBetSettlement(
                from_xml::<CancelXml>(body).map_err(decode_err)?.into(),
            ),
            MessageType::BetStop => {
                Payload::BetStop(from_xml::<BetStopXml>(body).map_err(decode_err)?.into())
            }
            MessageType::Player => Payload::Player(decode_player(body).map_err(decode_err)?),
            MessageType::Competitor => {
                Payload::Competitor(decode_competitor(body).map_err(decode_err)?)
            }
            MessageType::Fixture => Payload::Fixture(decode_fixture(body).map_err(decode_err)?),
            MessageType::Tournament => {
                Payload::Tournament(decode_tournament(body).map_err(decode_err)?)
            }
            MessageType::Markets => Payload::Markets(decode_markets(body).map_err(decode_err)?),
        };
        Ok(payload)
    }

    pub fn kind(&self) -> MessageType {
        match self {
            Payload::Alive(_) => MessageType::Alive,
            Payload::SnapshotComplete(_) => MessageType::SnapshotComplete,
            Payload::OddsChange(_) => MessageType::OddsChange,
            Payload::FixtureChange(_) => MessageType::FixtureChange,
            Payload::BetCancel(_) => MessageType::BetCancel,
            Payload::RollbackBetCancel(_) => MessageType::RollbackBetCancel,
            Payload::BetSettlement(_) => MessageType::BetSettlement,
            Payload::RollbackBetSettlement(_) => MessageType::RollbackBetSettlement,
            Payload::BetStop(_) => MessageType::BetStop,
            Payload::Player(_) => MessageType::Player,
            Payload::Competitor(_) => MessageType::Competitor,
            Payload::Fixture(_) => MessageType::Fixture,
            Payload::Tournament(_) => MessageType::Tournament,
            Payload::Markets(_) => MessageType::Markets,
        }
    }

    fn producer(&self) -> Option<Producer> {
        match self {
            Payload::Alive(m) => Some(m.producer),
            Payload::SnapshotComplete(m) => Some(m.producer),
            Payload::OddsChange(m) => Some(m.producer),
            Payload::FixtureChange(m) => Some(m.producer),
            Payload::BetCancel(m) => Some(m.producer),
            Payload::RollbackBetCancel(m) => Some(m.producer),
            Payload::BetSettlement(m) => Some(m.producer),
            Payload::RollbackBetSettlement(m) => Some(m.producer),
            Payload::BetStop(m) => Some(m.producer),
            _ => None,
        }
    }

    fn timestamp(&self) -> Option<i64> {
        match self {
            Payload::Alive(m) => Some(m.timestamp),
            Payload::SnapshotComplete(m) => Some(m.timestamp),
            Payload::OddsChange(m) => Some(m.timestamp),
            Payload::FixtureChange(m) => Some(m.timestamp),
            Payload::BetCancel(m) => Some(m.timestamp),
            Payload::RollbackBetCancel(m) => Some(m.timestamp),
            Payload::BetSettlement(m) => Some(m.timestamp),
            Payload::RollbackBetSettlement(m) => Some(m.timestamp),
            Payload::BetStop(m) => Some(m.timestamp),
            _ => None,
        }
    }

    fn event_urn(&self) -> Option<&Urn> {
        let urn = match self {
            Payload::OddsChange(m) => &m.event_urn,
            Payload::FixtureChange(m) => &m.event_urn,
            Payload::BetCancel(m) => &m.event_urn,
            Payload::RollbackBetCancel(m) => &m.event_urn,
            Payload::BetSettlement(m) => &m.event_urn,
            Payload::RollbackBetSettlement(m) => &m.event_urn,
            Payload::BetStop(m) => &m.event_urn,
            Payload::Fixture(m) => &m.urn,
            Payload::Tournament(m) => &m.urn,
            _ => return None,
        };
        (!urn.is_empty()).then_some(urn)
    }
}

/// The unit flowing between stages. Serializes to one flat JSON document:
/// header fields plus `type` and `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// When the message was received from the feed, or, for enrichment
    /// events, when the reference that triggered the fetch was received.
    pub received_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<Producer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_urn: Option<Urn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sport_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<Lang>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Event {
    /// Decodes a raw feed message, stamping it with the current time.
    pub fn decode(routing_key: &str, body: &[u8]) -> Result<Self, FeedError> {
        Self::decode_at(routing_key, body, now_millis())
    }

    pub fn decode_at(routing_key: &str, body: &[u8], received_at: i64) -> Result<Self, FeedError> {
        let key = RoutingKey::parse(routing_key)?;
        let payload = Payload::decode(key.kind, body)?;
        let event_urn = key.event_urn.or_else(|| payload.event_urn().cloned());
        Ok(Event {
            received_at,
            producer: payload.producer(),
            event_id: event_urn.as_ref().map(Urn::event_id),
            event_urn,
            sport_id: key.sport_id,
            lang: None,
            timestamp: payload.timestamp(),
            payload,
        })
    }

    fn lexicon(lang: Lang, payload: Payload, received_at: i64) -> Self {
        let event_urn = payload.event_urn().cloned();
        Event {
            received_at,
            producer: None,
            event_id: event_urn.as_ref().map(Urn::event_id),
            event_urn,
            sport_id: None,
            lang: Some(lang),
            timestamp: None,
            payload,
        }
    }

    pub fn player(lang: Lang, player: Player, received_at: i64) -> Self {
        Self::lexicon(lang, Payload::Player(player), received_at)
    }

    pub fn competitor(lang: Lang, competitor: Competitor, received_at: i64) -> Self {
        Self::lexicon(lang, Payload::Competitor(competitor), received_at)
    }

    pub fn fixture(lang: Lang, fixture: Fixture, received_at: i64) -> Self {
        Self::lexicon(lang, Payload::Fixture(fixture), received_at)
    }

    pub fn tournament(lang: Lang, tournament: FixtureTournament, received_at: i64) -> Self {
        Self::lexicon(lang, Payload::Tournament(tournament), received_at)
    }

    pub fn markets(lang: Lang, markets: MarketDescriptions, received_at: i64) -> Self {
        Self::lexicon(lang, Payload::Markets(markets), received_at)
    }

    pub fn kind(&self) -> MessageType {
        self.payload.kind()
    }

    pub fn is(&self, kind: MessageType) -> bool {
        self.kind() == kind
    }

    pub fn odds_change(&self) -> Option<&OddsChange> {
        match &self.payload {
            Payload::OddsChange(oc) => Some(oc),
            _ => None,
        }
    }

    pub fn fixture_change(&self) -> Option<&FixtureChange> {
        match &self.payload {
            Payload::FixtureChange(fc) => Some(fc),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ODDS_CHANGE: &[u8] = include_bytes!("../testdata/odds_change-0.xml");

    #[test]
    fn test_decode_odds_change() {
        let event = Event::decode_at("hi.pre.-.odds_change.1.sr:match.1234.-", ODDS_CHANGE, 99).unwrap();
        assert!(event.is(MessageType::OddsChange));
        assert_eq!(event.received_at, 99);
        assert_eq!(event.producer, Some(Producer(1)));
        assert_eq!(event.event_urn, Some(Urn::from("sr:match:1234")));
        assert_eq!(event.event_id, Some(1234));
        assert_eq!(event.sport_id, Some(1));
        assert_eq!(event.timestamp, Some(1234));

        let oc = event.odds_change().unwrap();
        assert_eq!(oc.event_id, 123);
        assert_eq!(oc.markets.len(), 7);
    }

    #[test]
    fn test_event_urn_falls_back_to_payload() {
        let event = Event::decode_at("hi.pre.-.odds_change.-.-.-.-", ODDS_CHANGE, 1).unwrap();
        assert_eq!(event.event_urn, Some(Urn::from("sr:match:123")));
        assert_eq!(event.event_id, Some(123));
        assert_eq!(event.sport_id, None);
    }

    #[test]
    fn test_routing_key_errors() {
        assert!(matches!(
            Event::decode("hi.pre.-.odds_change.1.sr:match.1234", ODDS_CHANGE),
            Err(FeedError::InvalidRoutingKey(_))
        ));
        assert!(matches!(
            Event::decode("hi.pre.-.odds_changed.1.sr:match.1234.-", ODDS_CHANGE),
            Err(FeedError::UnknownKind { .. })
        ));
        // enrichment kinds never come from the feed
        assert!(matches!(
            Event::decode("hi.pre.-.player.1.sr:match.1234.-", ODDS_CHANGE),
            Err(FeedError::UnknownKind { .. })
        ));
        assert!(matches!(
            Event::decode("hi.pre.-.odds_change.x.sr:match.1234.-", ODDS_CHANGE),
            Err(FeedError::InvalidRoutingKey(_))
        ));
    }

    #[test]
    fn test_malformed_payload() {
        let err = Event::decode("hi.pre.-.odds_change.1.sr:match.1234.-", b"<odds_change/>").unwrap_err();
        assert!(matches!(err, FeedError::Decode { kind: MessageType::OddsChange, .. }));
    }

    #[test]
    fn test_alive_is_system_message() {
        let body = br#"<alive product="1" timestamp="1561040000000" subscribed="1"/>"#;
        let event = Event::decode("-.-.-.alive.-.-.-.-", body).unwrap();
        assert_eq!(event.kind().kind(), MessageKind::System);
        assert_eq!(event.event_urn, None);
        assert_eq!(event.timestamp, Some(1_561_040_000_000));
    }

    #[test]
    fn test_event_json_document() {
        let event = Event::decode_at("hi.pre.-.odds_change.1.sr:match.1234.-", ODDS_CHANGE, 5).unwrap();
        let doc = serde_json::to_value(&event).unwrap();
        assert_eq!(doc["type"], "odds_change");
        assert_eq!(doc["eventId"], 1234);
        assert_eq!(doc["receivedAt"], 5);
        assert_eq!(doc["payload"]["markets"][0]["lineId"], 2_701_050_930_u32);
        assert_eq!(doc["payload"]["markets"][0]["specifiers"], "score=41.5");
        let variant_market = doc["payload"]["markets"]
            .as_array()
            .unwrap()
            .iter()
            .find(|m| m["id"] == 534)
            .unwrap();
        assert_eq!(
            variant_market["specifiers"],
            "variant=replay:pre:markettext:1|total=1.5|period=1"
        );

        let back: Event = serde_json::from_value(doc).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_lexicon_event_header() {
        let fixture = match Payload::decode(
            MessageType::Fixture,
            include_bytes!("../testdata/fixture-0.xml"),
        )
        .unwrap()
        {
            Payload::Fixture(f) => f,
            other => panic!("unexpected payload {other:?}"),
        };
        let event = Event::fixture(Lang::De, fixture, 7);
        assert_eq!(event.kind(), MessageType::Fixture);
        assert_eq!(event.kind().kind(), MessageKind::Lexicon);
        assert_eq!(event.lang, Some(Lang::De));
        assert_eq!(event.event_id, Some(8_696_826));
        assert_eq!(event.producer, None);
    }
}
