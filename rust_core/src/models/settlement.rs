use super::{OutcomeResult, Producer};
use crate::identity::{to_outcome_id, to_player_id, to_specifiers_line_id, to_variant_id, Specifiers};
use crate::urn::Urn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetSettlement {
    pub event_urn: Urn,
    pub event_id: i64,
    pub producer: Producer,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i64>,
    /// 1 live scouted, 2 confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certainty: Option<i8>,
    #[serde(default)]
    pub markets: Vec<BetSettlementMarket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetSettlementMarket {
    pub id: i32,
    pub line_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specifiers: Option<Specifiers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub void_reason: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default)]
    pub outcomes: Vec<BetSettlementOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetSettlementOutcome {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<i64>,
    pub result: OutcomeResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_heat_factor: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackBetSettlement {
    pub event_urn: Urn,
    pub event_id: i64,
    pub producer: Producer,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i64>,
    #[serde(default)]
    pub markets: Vec<BetCancelMarket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetCancel {
    pub event_urn: Urn,
    pub event_id: i64,
    pub producer: Producer,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superceded_by: Option<String>,
    #[serde(default)]
    pub markets: Vec<BetCancelMarket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackBetCancel {
    pub event_urn: Urn,
    pub event_id: i64,
    pub producer: Producer,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub markets: Vec<BetCancelMarket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetCancelMarket {
    pub id: i32,
    pub line_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specifiers: Option<Specifiers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub void_reason: Option<i32>,
}

// Wire format

#[derive(Deserialize)]
pub(crate) struct BetSettlementXml {
    #[serde(rename = "@event_id", default)]
    event_id: Urn,
    #[serde(rename = "@product")]
    product: Producer,
    #[serde(rename = "@timestamp")]
    timestamp: i64,
    #[serde(rename = "@request_id", default)]
    request_id: Option<i64>,
    #[serde(rename = "@certainty", default)]
    certainty: Option<i8>,
    #[serde(default)]
    outcomes: Option<SettledMarketsXml>,
}

#[derive(Deserialize)]
struct SettledMarketsXml {
    #[serde(rename = "market", default)]
    markets: Vec<BetSettlementMarketXml>,
}

#[derive(Deserialize)]
struct BetSettlementMarketXml {
    #[serde(rename = "@id")]
    id: i32,
    #[serde(rename = "@specifiers", default)]
    specifiers: String,
    #[serde(rename = "@extended_specifiers", default)]
    extended_specifiers: String,
    #[serde(rename = "@void_reason", default)]
    void_reason: Option<i32>,
    #[serde(rename = "@result", default)]
    result: Option<String>,
    #[serde(rename = "outcome", default)]
    outcomes: Vec<BetSettlementOutcomeXml>,
}

#[derive(Deserialize)]
struct BetSettlementOutcomeXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@result", default)]
    result: Option<i32>,
    #[serde(rename = "@void_factor", default)]
    void_factor: Option<f64>,
    #[serde(rename = "@dead_heat_factor", default)]
    dead_heat_factor: Option<f64>,
}

/// Shared shape of bet_cancel, rollback_bet_cancel and rollback_bet_settlement.
#[derive(Deserialize)]
pub(crate) struct CancelXml {
    #[serde(rename = "@event_id", default)]
    event_id: Urn,
    #[serde(rename = "@product")]
    product: Producer,
    #[serde(rename = "@timestamp")]
    timestamp: i64,
    #[serde(rename = "@request_id", default)]
    request_id: Option<i64>,
    #[serde(rename = "@start_time", default)]
    start_time: Option<i64>,
    #[serde(rename = "@end_time", default)]
    end_time: Option<i64>,
    #[serde(rename = "@superceded_by", default)]
    superceded_by: Option<String>,
    #[serde(rename = "market", default)]
    markets: Vec<CancelMarketXml>,
}

#[derive(Deserialize)]
struct CancelMarketXml {
    #[serde(rename = "@id")]
    id: i32,
    #[serde(rename = "@specifiers", default)]
    specifiers: String,
    #[serde(rename = "@extended_specifiers", default)]
    extended_specifiers: String,
    #[serde(rename = "@void_reason", default)]
    void_reason: Option<i32>,
}

impl From<BetSettlementXml> for BetSettlement {
    fn from(x: BetSettlementXml) -> Self {
        let markets = x
            .outcomes
            .map(|o| o.markets.into_iter().map(BetSettlementMarket::from).collect())
            .unwrap_or_default();
        BetSettlement {
            event_id: x.event_id.event_id(),
            event_urn: x.event_id,
            producer: x.product,
            timestamp: x.timestamp,
            request_id: x.request_id,
            certainty: x.certainty,
            markets,
        }
    }
}

impl From<BetSettlementMarketXml> for BetSettlementMarket {
    fn from(x: BetSettlementMarketXml) -> Self {
        let (specifiers, ids) = to_specifiers_line_id(&x.specifiers, &x.extended_specifiers);
        BetSettlementMarket {
            id: x.id,
            line_id: ids.line_id,
            specifiers,
            void_reason: x.void_reason,
            result: x.result,
            outcomes: x
                .outcomes
                .into_iter()
                .map(|o| {
                    let result = OutcomeResult::classify(o.result, o.void_factor, o.dead_heat_factor);
                    BetSettlementOutcome {
                        id: to_outcome_id(&o.id),
                        player_id: to_player_id(&o.id),
                        result,
                        dead_heat_factor: o
                            .dead_heat_factor
                            .filter(|_| result == OutcomeResult::WinWithDeadHeat),
                    }
                })
                .collect(),
        }
    }
}

impl From<CancelMarketXml> for BetCancelMarket {
    fn from(x: CancelMarketXml) -> Self {
        let (specifiers, ids) = to_specifiers_line_id(&x.specifiers, &x.extended_specifiers);
        let variant_id = specifiers
            .as_ref()
            .and_then(Specifiers::variant)
            .map(to_variant_id);
        BetCancelMarket {
            id: x.id,
            line_id: ids.line_id,
            variant_id,
            specifiers,
            void_reason: x.void_reason,
        }
    }
}

fn cancel_markets(markets: Vec<CancelMarketXml>) -> Vec<BetCancelMarket> {
    markets.into_iter().map(BetCancelMarket::from).collect()
}

impl From<CancelXml> for BetCancel {
    fn from(x: CancelXml) -> Self {
        BetCancel {
            event_id: x.event_id.event_id(),
            event_urn: x.event_id,
            producer: x.product,
            timestamp: x.timestamp,
            request_id: x.request_id,
            start_time: x.start_time,
            end_time: x.end_time,
            superceded_by: x.superceded_by,
            markets: cancel_markets(x.markets),
        }
    }
}

impl From<CancelXml> for RollbackBetCancel {
    fn from(x: CancelXml) -> Self {
        RollbackBetCancel {
            event_id: x.event_id.event_id(),
            event_urn: x.event_id,
            producer: x.product,
            timestamp: x.timestamp,
            request_id: x.request_id,
            start_time: x.start_time,
            end_time: x.end_time,
            markets: cancel_markets(x.markets),
        }
    }
}

impl From<CancelXml> for RollbackBetSettlement {
    fn from(x: CancelXml) -> Self {
        RollbackBetSettlement {
            event_id: x.event_id.event_id(),
            event_urn: x.event_id,
            producer: x.product,
            timestamp: x.timestamp,
            request_id: x.request_id,
            markets: cancel_markets(x.markets),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::from_xml;

    #[test]
    fn test_bet_settlement_results() {
        let body = include_str!("../../testdata/bet_settlement-0.xml");
        let bs: BetSettlement = from_xml::<BetSettlementXml>(body.as_bytes()).unwrap().into();
        assert_eq!(bs.event_id, 1234);
        assert_eq!(bs.certainty, Some(2));
        assert_eq!(bs.markets.len(), 2);

        let results: Vec<OutcomeResult> = bs.markets[0].outcomes.iter().map(|o| o.result).collect();
        assert_eq!(
            results,
            vec![
                OutcomeResult::Win,
                OutcomeResult::Lose,
                OutcomeResult::Void,
                OutcomeResult::HalfWin,
                OutcomeResult::HalfLose,
            ]
        );

        let dead_heat = &bs.markets[1].outcomes[0];
        assert_eq!(dead_heat.result, OutcomeResult::WinWithDeadHeat);
        assert_eq!(dead_heat.dead_heat_factor, Some(0.5));
        assert_eq!(dead_heat.player_id, Some(555));
        assert_eq!(bs.markets[1].line_id, crate::identity::to_line_id("total=2.5"));
    }

    #[test]
    fn test_bet_cancel_window() {
        let body = include_str!("../../testdata/bet_cancel-0.xml");
        let bc: BetCancel = from_xml::<CancelXml>(body.as_bytes()).unwrap().into();
        assert_eq!(bc.event_urn.as_str(), "sr:match:16807109");
        assert_eq!(bc.start_time, Some(1_561_040_000_000));
        assert_eq!(bc.end_time, None);
        assert_eq!(bc.markets.len(), 2);
        assert_eq!(bc.markets[0].void_reason, Some(12));
        assert!(bc.markets[1].variant_id.is_some());
    }
}
