use super::{MarketStatus, Producer};
use crate::urn::Urn;
use serde::{Deserialize, Serialize};

/// Producer heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alive {
    pub producer: Producer,
    pub timestamp: i64,
    #[serde(default)]
    pub subscribed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotComplete {
    pub producer: Producer,
    pub timestamp: i64,
    pub request_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureChange {
    pub event_urn: Urn,
    pub event_id: i64,
    pub producer: Producer,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_type: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_live_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetStop {
    pub event_urn: Urn,
    pub event_id: i64,
    pub producer: Producer,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i64>,
    /// Market groups the stop applies to, `all` when absent.
    #[serde(default)]
    pub groups: Vec<String>,
    pub market_status: MarketStatus,
}

// Wire format

#[derive(Deserialize)]
pub(crate) struct AliveXml {
    #[serde(rename = "@product")]
    product: Producer,
    #[serde(rename = "@timestamp")]
    timestamp: i64,
    #[serde(rename = "@subscribed", default)]
    subscribed: Option<bool>,
}

#[derive(Deserialize)]
pub(crate) struct SnapshotCompleteXml {
    #[serde(rename = "@product")]
    product: Producer,
    #[serde(rename = "@timestamp")]
    timestamp: i64,
    #[serde(rename = "@request_id", default)]
    request_id: i64,
}

#[derive(Deserialize)]
pub(crate) struct FixtureChangeXml {
    #[serde(rename = "@event_id", default)]
    event_id: Urn,
    #[serde(rename = "@product")]
    product: Producer,
    #[serde(rename = "@timestamp")]
    timestamp: i64,
    #[serde(rename = "@request_id", default)]
    request_id: Option<i64>,
    #[serde(rename = "@change_type", default)]
    change_type: Option<i32>,
    #[serde(rename = "@start_time", default)]
    start_time: Option<i64>,
    #[serde(rename = "@next_live_time", default)]
    next_live_time: Option<i64>,
}

#[derive(Deserialize)]
pub(crate) struct BetStopXml {
    #[serde(rename = "@event_id", default)]
    event_id: Urn,
    #[serde(rename = "@product")]
    product: Producer,
    #[serde(rename = "@timestamp")]
    timestamp: i64,
    #[serde(rename = "@request_id", default)]
    request_id: Option<i64>,
    #[serde(rename = "@groups", default)]
    groups: Option<String>,
    #[serde(rename = "@market_status", default)]
    market_status: Option<MarketStatus>,
}

impl From<AliveXml> for Alive {
    fn from(x: AliveXml) -> Self {
        Alive {
            producer: x.product,
            timestamp: x.timestamp,
            subscribed: x.subscribed.unwrap_or(false),
        }
    }
}

impl From<SnapshotCompleteXml> for SnapshotComplete {
    fn from(x: SnapshotCompleteXml) -> Self {
        SnapshotComplete {
            producer: x.product,
            timestamp: x.timestamp,
            request_id: x.request_id,
        }
    }
}

impl From<FixtureChangeXml> for FixtureChange {
    fn from(x: FixtureChangeXml) -> Self {
        FixtureChange {
            event_id: x.event_id.event_id(),
            event_urn: x.event_id,
            producer: x.product,
            timestamp: x.timestamp,
            request_id: x.request_id,
            change_type: x.change_type,
            start_time: x.start_time,
            next_live_time: x.next_live_time,
        }
    }
}

impl From<BetStopXml> for BetStop {
    fn from(x: BetStopXml) -> Self {
        BetStop {
            event_id: x.event_id.event_id(),
            event_urn: x.event_id,
            producer: x.product,
            timestamp: x.timestamp,
            request_id: x.request_id,
            groups: x
                .groups
                .map(|g| g.split('|').map(str::to_string).collect())
                .unwrap_or_else(|| vec!["all".to_string()]),
            market_status: x.market_status.unwrap_or(MarketStatus::Suspended),
        }
    }
}
