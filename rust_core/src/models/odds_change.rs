use super::{CashoutStatus, EventStatus, MarketStatus, Producer, Team};
use crate::identity::{
    to_competitors, to_outcome_id, to_player_id, to_specifiers_line_id, to_variant_id, Specifiers,
};
use crate::urn::Urn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OddsChange {
    pub event_urn: Urn,
    pub event_id: i64,
    pub producer: Producer,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markets: Vec<Market>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub betting_status: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub betstop_reason: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odds_change_reason: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sport_event_status: Option<SportEventStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odds_generation_properties: Option<OddsGenerationProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i64>,
}

impl OddsChange {
    /// Player ids referenced by outcomes, in market order. May repeat.
    pub fn players(&self) -> impl Iterator<Item = i64> + '_ {
        self.markets
            .iter()
            .flat_map(|m| m.outcomes.iter())
            .filter_map(|o| o.player_id)
    }

    /// Distinct competitor ids referenced by outcomes, ascending.
    pub fn competitors(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .markets
            .iter()
            .flat_map(|m| m.outcomes.iter())
            .filter_map(|o| o.competitors.as_deref())
            .flatten()
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// `(market id, variant)` for every market carrying a variant specifier.
    pub fn variant_markets(&self) -> impl Iterator<Item = (i32, &str)> + '_ {
        self.markets
            .iter()
            .filter_map(|m| m.variant_specifier().map(|v| (m.id, v)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub id: i32,
    pub line_id: u32,
    pub no_variant_line_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specifiers: Option<Specifiers>,
    pub status: MarketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cashout_status: Option<CashoutStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favourite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_betstop: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outcomes: Vec<Outcome>,
}

impl Market {
    pub fn variant_specifier(&self) -> Option<&str> {
        self.specifiers.as_ref()?.variant()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competitors: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<Team>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SportEventStatus {
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_status: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_score: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_score: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<Clock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub period_scores: Vec<PeriodScore>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stoppage_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodScore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_status_code: Option<i32>,
    pub home_score: i32,
    pub away_score: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OddsGenerationProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_totals: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_supremacy: Option<f64>,
}

// Wire format

#[derive(Deserialize)]
pub(crate) struct OddsChangeXml {
    #[serde(rename = "@event_id", default)]
    event_id: Urn,
    #[serde(rename = "@product")]
    product: Producer,
    #[serde(rename = "@timestamp")]
    timestamp: i64,
    #[serde(rename = "@odds_change_reason", default)]
    odds_change_reason: Option<i32>,
    #[serde(rename = "@request_id", default)]
    request_id: Option<i64>,
    #[serde(default)]
    sport_event_status: Option<SportEventStatusXml>,
    #[serde(default)]
    odds_generation_properties: Option<OddsGenerationPropertiesXml>,
    #[serde(default)]
    odds: Option<OddsXml>,
}

#[derive(Deserialize)]
struct OddsXml {
    #[serde(rename = "@betting_status", default)]
    betting_status: Option<i32>,
    #[serde(rename = "@betstop_reason", default)]
    betstop_reason: Option<i32>,
    #[serde(rename = "market", default)]
    markets: Vec<MarketXml>,
}

#[derive(Deserialize)]
struct MarketXml {
    #[serde(rename = "@id")]
    id: i32,
    #[serde(rename = "@status", default)]
    status: Option<MarketStatus>,
    #[serde(rename = "@specifiers", default)]
    specifiers: String,
    #[serde(rename = "@extended_specifiers", default)]
    extended_specifiers: String,
    #[serde(rename = "@cashout_status", default)]
    cashout_status: Option<CashoutStatus>,
    #[serde(rename = "@favourite", default)]
    favourite: Option<bool>,
    #[serde(default)]
    market_metadata: Option<MarketMetadataXml>,
    #[serde(rename = "outcome", default)]
    outcomes: Vec<OutcomeXml>,
}

#[derive(Deserialize)]
struct MarketMetadataXml {
    #[serde(rename = "@next_betstop", default)]
    next_betstop: Option<i64>,
}

#[derive(Deserialize)]
struct OutcomeXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@odds", default)]
    odds: Option<f64>,
    #[serde(rename = "@probabilities", default)]
    probabilities: Option<f64>,
    #[serde(rename = "@active", default)]
    active: Option<bool>,
    #[serde(rename = "@team", default)]
    team: Option<Team>,
}

#[derive(Deserialize)]
pub(crate) struct SportEventStatusXml {
    #[serde(rename = "@status")]
    status: EventStatus,
    #[serde(rename = "@match_status", default)]
    match_status: Option<i32>,
    #[serde(rename = "@home_score", default)]
    home_score: Option<f64>,
    #[serde(rename = "@away_score", default)]
    away_score: Option<f64>,
    #[serde(rename = "@reporting", default)]
    reporting: Option<i32>,
    #[serde(default)]
    clock: Option<ClockXml>,
    #[serde(default)]
    period_scores: Option<PeriodScoresXml>,
}

#[derive(Deserialize)]
struct ClockXml {
    #[serde(rename = "@match_time", default)]
    match_time: Option<String>,
    #[serde(rename = "@stoppage_time", default)]
    stoppage_time: Option<String>,
    #[serde(rename = "@remaining_time", default)]
    remaining_time: Option<String>,
    #[serde(rename = "@stopped", default)]
    stopped: Option<bool>,
}

#[derive(Deserialize)]
struct PeriodScoresXml {
    #[serde(rename = "period_score", default)]
    scores: Vec<PeriodScoreXml>,
}

#[derive(Deserialize)]
struct PeriodScoreXml {
    #[serde(rename = "@number", default)]
    number: Option<i32>,
    #[serde(rename = "@match_status_code", default)]
    match_status_code: Option<i32>,
    #[serde(rename = "@home_score", default)]
    home_score: i32,
    #[serde(rename = "@away_score", default)]
    away_score: i32,
}

#[derive(Deserialize)]
struct OddsGenerationPropertiesXml {
    #[serde(rename = "@expected_totals", default)]
    expected_totals: Option<f64>,
    #[serde(rename = "@expected_supremacy", default)]
    expected_supremacy: Option<f64>,
}

impl From<OddsChangeXml> for OddsChange {
    fn from(x: OddsChangeXml) -> Self {
        let (betting_status, betstop_reason, markets) = match x.odds {
            Some(odds) => (
                odds.betting_status,
                odds.betstop_reason,
                odds.markets.into_iter().map(Market::from).collect(),
            ),
            None => (None, None, Vec::new()),
        };
        OddsChange {
            event_id: x.event_id.event_id(),
            event_urn: x.event_id,
            producer: x.product,
            timestamp: x.timestamp,
            markets,
            betting_status,
            betstop_reason,
            odds_change_reason: x.odds_change_reason,
            sport_event_status: x.sport_event_status.map(SportEventStatus::from),
            odds_generation_properties: x.odds_generation_properties.map(|p| {
                OddsGenerationProperties {
                    expected_totals: p.expected_totals,
                    expected_supremacy: p.expected_supremacy,
                }
            }),
            request_id: x.request_id,
        }
    }
}

impl From<MarketXml> for Market {
    fn from(x: MarketXml) -> Self {
        let (specifiers, ids) = to_specifiers_line_id(&x.specifiers, &x.extended_specifiers);
        let variant_id = specifiers
            .as_ref()
            .and_then(Specifiers::variant)
            .map(to_variant_id);
        Market {
            id: x.id,
            line_id: ids.line_id,
            no_variant_line_id: ids.no_variant_line_id,
            variant_id,
            specifiers,
            status: x.status.unwrap_or_default(),
            cashout_status: x.cashout_status,
            favourite: x.favourite,
            next_betstop: x.market_metadata.and_then(|m| m.next_betstop),
            outcomes: x.outcomes.into_iter().map(Outcome::from).collect(),
        }
    }
}

impl From<OutcomeXml> for Outcome {
    fn from(x: OutcomeXml) -> Self {
        Outcome {
            id: to_outcome_id(&x.id),
            player_id: to_player_id(&x.id),
            competitors: to_competitors(&x.id),
            odds: x.odds,
            probabilities: x.probabilities,
            active: x.active,
            team: x.team,
        }
    }
}

impl From<SportEventStatusXml> for SportEventStatus {
    fn from(x: SportEventStatusXml) -> Self {
        SportEventStatus {
            status: x.status,
            match_status: x.match_status,
            home_score: x.home_score.map(|s| s as i32),
            away_score: x.away_score.map(|s| s as i32),
            reporting: x.reporting,
            clock: x.clock.map(|c| Clock {
                match_time: c.match_time,
                stoppage_time: c.stoppage_time,
                remaining_time: c.remaining_time,
                stopped: c.stopped,
            }),
            period_scores: x
                .period_scores
                .map(|p| {
                    p.scores
                        .into_iter()
                        .map(|s| PeriodScore {
                            number: s.number,
                            match_status_code: s.match_status_code,
                            home_score: s.home_score,
                            away_score: s.away_score,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}
