//! Reference data served by the catalog API.

use super::{from_xml, Gender};
use crate::identity::{to_variant_id, variant_specifier};
use crate::urn::Urn;
use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::DeError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jersey_number: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Competitor {
    pub id: i64,
    pub urn: Urn,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abbreviation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub r#virtual: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub players: Vec<CompetitorPlayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorPlayer {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abbreviation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sport {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tournament {
    pub id: i64,
    pub urn: Urn,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureCompetitor {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abbreviation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub r#virtual: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    /// Event identity of `urn`.
    pub id: i64,
    pub urn: Urn,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub start_time_tbd: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveodds: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sport: Option<Sport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament: Option<Tournament>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<Season>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub competitors: Vec<FixtureCompetitor>,
}

impl Fixture {
    pub fn home(&self) -> Option<&FixtureCompetitor> {
        self.competitor("home")
    }

    pub fn away(&self) -> Option<&FixtureCompetitor> {
        self.competitor("away")
    }

    fn competitor(&self, qualifier: &str) -> Option<&FixtureCompetitor> {
        self.competitors
            .iter()
            .find(|c| c.qualifier.as_deref() == Some(qualifier))
    }
}

/// Tournament, simple tournament or season resolved through the fixture
/// endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureTournament {
    pub id: i64,
    pub urn: Urn,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sport: Option<Sport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<Season>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketDescriptions(pub Vec<MarketDescription>);

impl MarketDescriptions {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarketDescription> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDescription {
    pub id: i32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outcomes: Vec<MarketOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specifiers: Vec<MarketSpecifier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOutcome {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSpecifier {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

// Wire format

#[derive(Deserialize)]
struct PlayerProfileXml {
    player: PlayerXml,
}

#[derive(Deserialize)]
struct PlayerXml {
    #[serde(rename = "@id")]
    id: Urn,
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@full_name", default)]
    full_name: Option<String>,
    #[serde(rename = "@nickname", default)]
    nickname: Option<String>,
    #[serde(rename = "@type", default)]
    kind: Option<String>,
    #[serde(rename = "@date_of_birth", default)]
    date_of_birth: Option<String>,
    #[serde(rename = "@nationality", default)]
    nationality: Option<String>,
    #[serde(rename = "@country_code", default)]
    country_code: Option<String>,
    #[serde(rename = "@height", default)]
    height: Option<i32>,
    #[serde(rename = "@weight", default)]
    weight: Option<i32>,
    #[serde(rename = "@jersey_number", default)]
    jersey_number: Option<i32>,
    #[serde(rename = "@gender", default)]
    gender: Option<String>,
}

#[derive(Deserialize)]
struct CompetitorProfileXml {
    competitor: CompetitorXml,
    #[serde(default)]
    players: Option<PlayersXml>,
}

#[derive(Deserialize)]
struct PlayersXml {
    #[serde(rename = "player", default)]
    players: Vec<CompetitorPlayerXml>,
}

#[derive(Deserialize)]
struct CompetitorXml {
    #[serde(rename = "@id")]
    id: Urn,
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@qualifier", default)]
    qualifier: Option<String>,
    #[serde(rename = "@abbreviation", default)]
    abbreviation: Option<String>,
    #[serde(rename = "@country", default)]
    country: Option<String>,
    #[serde(rename = "@country_code", default)]
    country_code: Option<String>,
    #[serde(rename = "@virtual", default)]
    r#virtual: Option<bool>,
}

#[derive(Deserialize)]
struct CompetitorPlayerXml {
    #[serde(rename = "@id")]
    id: Urn,
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@abbreviation", default)]
    abbreviation: Option<String>,
    #[serde(rename = "@nationality", default)]
    nationality: Option<String>,
}

#[derive(Deserialize)]
struct FixtureRspXml {
    fixture: FixtureXml,
}

#[derive(Deserialize)]
struct ScheduleXml {
    #[serde(rename = "sport_event", default)]
    events: Vec<FixtureXml>,
}

#[derive(Deserialize)]
struct FixtureXml {
    #[serde(rename = "@id")]
    id: Urn,
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "@type", default)]
    kind: Option<String>,
    #[serde(rename = "@status", default)]
    status: Option<String>,
    #[serde(rename = "@scheduled", default)]
    scheduled: Option<String>,
    #[serde(rename = "@scheduled_end", default)]
    scheduled_end: Option<String>,
    #[serde(rename = "@start_time_tbd", default)]
    start_time_tbd: Option<bool>,
    #[serde(rename = "@liveodds", default)]
    liveodds: Option<String>,
    #[serde(rename = "@replaced_by", default)]
    replaced_by: Option<String>,
    #[serde(default)]
    tournament: Option<TournamentXml>,
    #[serde(default)]
    season: Option<SeasonXml>,
    #[serde(default)]
    competitors: Option<CompetitorsXml>,
}

#[derive(Deserialize)]
struct CompetitorsXml {
    #[serde(rename = "competitor", default)]
    competitors: Vec<CompetitorXml>,
}

#[derive(Deserialize)]
struct TournamentXml {
    #[serde(rename = "@id", default)]
    id: Urn,
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(default)]
    sport: Option<NamedXml>,
    #[serde(default)]
    category: Option<CategoryXml>,
    #[serde(default)]
    current_season: Option<SeasonXml>,
}

#[derive(Deserialize)]
struct TournamentInfoXml {
    tournament: TournamentXml,
    #[serde(default)]
    season: Option<SeasonXml>,
}

#[derive(Deserialize)]
struct NamedXml {
    #[serde(rename = "@id")]
    id: Urn,
    #[serde(rename = "@name", default)]
    name: String,
}

#[derive(Deserialize)]
struct CategoryXml {
    #[serde(rename = "@id")]
    id: Urn,
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@country_code", default)]
    country_code: Option<String>,
}

#[derive(Deserialize)]
struct SeasonXml {
    #[serde(rename = "@id")]
    id: Urn,
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@start_date", default)]
    start_date: Option<String>,
    #[serde(rename = "@end_date", default)]
    end_date: Option<String>,
    #[serde(rename = "@year", default)]
    year: Option<String>,
}

#[derive(Deserialize)]
struct MarketDescriptionsXml {
    #[serde(rename = "market", default)]
    markets: Vec<MarketDescriptionXml>,
}

#[derive(Deserialize)]
struct MarketDescriptionXml {
    #[serde(rename = "@id")]
    id: i32,
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@variant", default)]
    variant: Option<String>,
    #[serde(rename = "@groups", default)]
    groups: Option<String>,
    #[serde(default)]
    outcomes: Option<MarketOutcomesXml>,
    #[serde(default)]
    specifiers: Option<MarketSpecifiersXml>,
}

#[derive(Deserialize)]
struct MarketOutcomesXml {
    #[serde(rename = "outcome", default)]
    outcomes: Vec<MarketOutcomeXml>,
}

#[derive(Deserialize)]
struct MarketOutcomeXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name", default)]
    name: String,
}

#[derive(Deserialize)]
struct MarketSpecifiersXml {
    #[serde(rename = "specifier", default)]
    specifiers: Vec<MarketSpecifierXml>,
}

#[derive(Deserialize)]
struct MarketSpecifierXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@type", default)]
    kind: String,
}

fn parse_time(s: Option<String>) -> Option<DateTime<Utc>> {
    let s = s?;
    DateTime::parse_from_rfc3339(&s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

impl From<NamedXml> for Sport {
    fn from(x: NamedXml) -> Self {
        Sport { id: x.id.id(), name: x.name }
    }
}

impl From<CategoryXml> for Category {
    fn from(x: CategoryXml) -> Self {
        Category {
            id: x.id.id(),
            name: x.name,
            country_code: x.country_code,
        }
    }
}

impl From<SeasonXml> for Season {
    fn from(x: SeasonXml) -> Self {
        Season {
            id: x.id.id(),
            name: x.name,
            start_date: x.start_date,
            end_date: x.end_date,
            year: x.year,
        }
    }
}

impl From<CompetitorXml> for FixtureCompetitor {
    fn from(x: CompetitorXml) -> Self {
        FixtureCompetitor {
            id: x.id.id(),
            name: x.name,
            qualifier: x.qualifier,
            abbreviation: x.abbreviation,
            country_code: x.country_code,
            r#virtual: x.r#virtual.unwrap_or(false),
        }
    }
}

impl From<FixtureXml> for Fixture {
    fn from(x: FixtureXml) -> Self {
        let (tournament, sport, category) = match x.tournament {
            Some(t) => {
                let tournament = (!t.id.is_empty()).then(|| Tournament {
                    id: t.id.id(),
                    urn: t.id.clone(),
                    name: t.name,
                });
                (tournament, t.sport.map(Sport::from), t.category.map(Category::from))
            }
            None => (None, None, None),
        };
        Fixture {
            id: x.id.event_id(),
            urn: x.id,
            name: x.name,
            kind: x.kind,
            status: x.status,
            scheduled: parse_time(x.scheduled),
            scheduled_end: parse_time(x.scheduled_end),
            start_time_tbd: x.start_time_tbd.unwrap_or(false),
            liveodds: x.liveodds,
            replaced_by: x.replaced_by,
            sport,
            category,
            tournament,
            season: x.season.map(Season::from),
            competitors: x
                .competitors
                .map(|c| c.competitors.into_iter().map(FixtureCompetitor::from).collect())
                .unwrap_or_default(),
        }
    }
}

pub(crate) fn decode_player(body: &[u8]) -> Result<Player, DeError> {
    let p = from_xml::<PlayerProfileXml>(body)?.player;
    Ok(Player {
        id: p.id.id(),
        name: p.name,
        full_name: p.full_name,
        nickname: p.nickname,
        kind: p.kind,
        date_of_birth: p
            .date_of_birth
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        nationality: p.nationality,
        country_code: p.country_code,
        height: p.height,
        weight: p.weight,
        jersey_number: p.jersey_number,
        gender: p.gender.as_deref().and_then(Gender::parse),
    })
}

pub(crate) fn decode_competitor(body: &[u8]) -> Result<Competitor, DeError> {
    let profile = from_xml::<CompetitorProfileXml>(body)?;
    let c = profile.competitor;
    Ok(Competitor {
        id: c.id.id(),
        urn: c.id,
        name: c.name,
        abbreviation: c.abbreviation,
        country: c.country,
        country_code: c.country_code,
        r#virtual: c.r#virtual.unwrap_or(false),
        players: profile
            .players
            .map(|p| {
                p.players
                    .into_iter()
                    .map(|p| CompetitorPlayer {
                        id: p.id.id(),
                        name: p.name,
                        abbreviation: p.abbreviation,
                        nationality: p.nationality,
                    })
                    .collect()
            })
            .unwrap_or_default(),
    })
}

pub(crate) fn decode_fixture(body: &[u8]) -> Result<Fixture, DeError> {
    Ok(from_xml::<FixtureRspXml>(body)?.fixture.into())
}

pub(crate) fn decode_schedule(body: &[u8]) -> Result<Vec<Fixture>, DeError> {
    Ok(from_xml::<ScheduleXml>(body)?
        .events
        .into_iter()
        .map(Fixture::from)
        .collect())
}

pub(crate) fn decode_tournament(body: &[u8]) -> Result<FixtureTournament, DeError> {
    let info = from_xml::<TournamentInfoXml>(body)?;
    let t = info.tournament;
    Ok(FixtureTournament {
        id: t.id.id(),
        urn: t.id,
        name: t.name,
        sport: t.sport.map(Sport::from),
        category: t.category.map(Category::from),
        season: info.season.or(t.current_season).map(Season::from),
    })
}

pub(crate) fn decode_markets(body: &[u8]) -> Result<MarketDescriptions, DeError> {
    let markets = from_xml::<MarketDescriptionsXml>(body)?
        .markets
        .into_iter()
        .map(|m| {
            let variant_id = m
                .variant
                .as_deref()
                .map(|v| to_variant_id(variant_specifier(v)));
            MarketDescription {
                id: m.id,
                name: m.name,
                variant: m.variant,
                variant_id,
                groups: m
                    .groups
                    .map(|g| g.split('|').map(str::to_string).collect())
                    .unwrap_or_default(),
                outcomes: m
                    .outcomes
                    .map(|o| {
                        o.outcomes
                            .into_iter()
                            .map(|o| MarketOutcome { id: o.id, name: o.name })
                            .collect()
                    })
                    .unwrap_or_default(),
                specifiers: m
                    .specifiers
                    .map(|s| {
                        s.specifiers
                            .into_iter()
                            .map(|s| MarketSpecifier { name: s.name, kind: s.kind })
                            .collect()
                    })
                    .unwrap_or_default(),
            }
        })
        .collect();
    Ok(MarketDescriptions(markets))
}
