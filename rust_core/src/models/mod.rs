//! Typed feed payloads and catalog entities.
//!
//! Every payload decodes from the XML documents the feed and the catalog
//! serve (through private `*Xml` wire structs) and serializes to the JSON
//! event document with stable camelCase field names.

pub(crate) mod catalog;
pub(crate) mod feed;
pub(crate) mod odds_change;
pub(crate) mod settlement;

pub use catalog::{
    Category, Competitor, CompetitorPlayer, Fixture, FixtureCompetitor, FixtureTournament,
    MarketDescription, MarketDescriptions, MarketOutcome, MarketSpecifier, Player, Season, Sport,
    Tournament,
};
pub use feed::{Alive, BetStop, FixtureChange, SnapshotComplete};
pub use odds_change::{
    Clock, Market, OddsChange, OddsGenerationProperties, Outcome, PeriodScore, SportEventStatus,
};
pub use settlement::{
    BetCancel, BetCancelMarket, BetSettlement, BetSettlementMarket, BetSettlementOutcome,
    RollbackBetCancel, RollbackBetSettlement,
};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decodes an XML document into its wire struct.
pub(crate) fn from_xml<T: DeserializeOwned>(body: &[u8]) -> Result<T, quick_xml::DeError> {
    quick_xml::de::from_reader(body)
}

/// Enums carried on the wire as small signed integers. They keep the integer
/// form in the JSON document too.
macro_rules! int_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn code(self) -> i8 {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            pub fn from_code(code: i8) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_i8(self.code())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let code = i8::deserialize(deserializer)?;
                Self::from_code(code).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        concat!("unknown ", stringify!($name), " code {}"),
                        code
                    ))
                })
            }
        }
    };
}

int_enum!(
    /// Market status; absent on the wire means `Active`.
    MarketStatus {
        Active = 1,
        Suspended = -1,
        Inactive = 0,
        HandedOver = -2,
        Settled = -3,
        Cancelled = -4,
    }
);

impl Default for MarketStatus {
    fn default() -> Self {
        Self::Active
    }
}

int_enum!(CashoutStatus {
    Available = 1,
    Unavailable = -1,
    Closed = -2,
});

int_enum!(Team { Home = 1, Away = 2 });

int_enum!(EventStatus {
    NotStarted = 0,
    Live = 1,
    Suspended = 2,
    Ended = 3,
    Closed = 4,
    Cancelled = 5,
    Delayed = 6,
    Interrupted = 7,
    Postponed = 8,
    Abandoned = 9,
});

/// Settlement result of a single outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeResult {
    Unknown,
    Lose,
    Win,
    Void,
    HalfLose,
    HalfWin,
    WinWithDeadHeat,
}

impl OutcomeResult {
    /// Classifies the `result` / `void_factor` / `dead_heat_factor` triple of a
    /// settled outcome.
    pub fn classify(result: Option<i32>, void_factor: Option<f64>, dead_heat: Option<f64>) -> Self {
        let Some(result) = result else {
            return Self::Unknown;
        };
        let void_factor = void_factor.unwrap_or(0.0);
        match (result, void_factor) {
            (0, v) if v == 0.0 => Self::Lose,
            (1, v) if v == 0.0 => {
                if dead_heat.map_or(false, |f| f > 0.0) {
                    Self::WinWithDeadHeat
                } else {
                    Self::Win
                }
            }
            (0, v) if v == 1.0 => Self::Void,
            (0, v) if v == 0.5 => Self::HalfLose,
            (1, v) if v == 0.5 => Self::HalfWin,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            _ => None,
        }
    }
}

/// Upstream odds producer, identified by the payload's `product` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Producer(pub i32);

struct ProducerInfo {
    id: i32,
    code: &'static str,
    name: &'static str,
    is_virtual: bool,
}

const PRODUCERS: &[ProducerInfo] = &[
    ProducerInfo { id: 1, code: "lo", name: "Live Odds", is_virtual: false },
    ProducerInfo { id: 3, code: "pre", name: "Ctrl", is_virtual: false },
    ProducerInfo { id: 4, code: "bp", name: "BetPal", is_virtual: false },
    ProducerInfo { id: 5, code: "pc", name: "Premium Cricket", is_virtual: false },
    ProducerInfo { id: 6, code: "vf", name: "Virtual football", is_virtual: true },
    ProducerInfo { id: 7, code: "wns", name: "Numbers Betting", is_virtual: false },
    ProducerInfo { id: 8, code: "vbl", name: "Virtual Basketball League", is_virtual: true },
    ProducerInfo { id: 9, code: "vto", name: "Virtual Tennis Open", is_virtual: true },
    ProducerInfo { id: 10, code: "vdr", name: "Virtual Dog Racing", is_virtual: true },
    ProducerInfo { id: 11, code: "vhc", name: "Virtual Horse Classics", is_virtual: true },
    ProducerInfo { id: 12, code: "vti", name: "Virtual Tennis In-Play", is_virtual: true },
    ProducerInfo { id: 15, code: "vbi", name: "Virtual Baseball In-Play", is_virtual: true },
];

impl Producer {
    pub const LIVE_ODDS: Producer = Producer(1);
    pub const PREMATCH: Producer = Producer(3);

    fn info(self) -> Option<&'static ProducerInfo> {
        PRODUCERS.iter().find(|p| p.id == self.0)
    }

    pub fn code(self) -> &'static str {
        self.info().map_or("unknown", |p| p.code)
    }

    pub fn name(self) -> &'static str {
        self.info().map_or("unknown", |p| p.name)
    }

    pub fn is_virtual(self) -> bool {
        self.info().map_or(false, |p| p.is_virtual)
    }

    /// Live odds or prematch.
    pub fn is_sports(self) -> bool {
        self == Self::LIVE_ODDS || self == Self::PREMATCH
    }
}

impl fmt::Display for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Catalog language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    En,
    De,
    Fr,
    It,
    Es,
    Pt,
    Nl,
    Pl,
    Ro,
    Ru,
    Tr,
    Hr,
    Sr,
    Sl,
    Hu,
    Zh,
}

impl Lang {
    pub const ALL: [Lang; 16] = [
        Lang::En,
        Lang::De,
        Lang::Fr,
        Lang::It,
        Lang::Es,
        Lang::Pt,
        Lang::Nl,
        Lang::Pl,
        Lang::Ro,
        Lang::Ru,
        Lang::Tr,
        Lang::Hr,
        Lang::Sr,
        Lang::Sl,
        Lang::Hu,
        Lang::Zh,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::De => "de",
            Lang::Fr => "fr",
            Lang::It => "it",
            Lang::Es => "es",
            Lang::Pt => "pt",
            Lang::Nl => "nl",
            Lang::Pl => "pl",
            Lang::Ro => "ro",
            Lang::Ru => "ru",
            Lang::Tr => "tr",
            Lang::Hr => "hr",
            Lang::Sr => "sr",
            Lang::Sl => "sl",
            Lang::Hu => "hu",
            Lang::Zh => "zh",
        }
    }

    /// Parses a comma separated list such as `en,de`. Unknown codes are
    /// returned as the error.
    pub fn parse_list(s: &str) -> Result<Vec<Lang>, String> {
        s.split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(|code| code.parse())
            .collect()
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Lang {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.to_ascii_lowercase();
        Lang::ALL
            .into_iter()
            .find(|lang| lang.code() == code)
            .ok_or_else(|| s.to_string())
    }
}
