//! Canonical integer identities derived from feed identifiers.
//!
//! Line, variant and outcome ids are FNV-1a 32-bit hashes of the raw strings
//! the feed carries, so identical inputs map to identical ids on every host.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const PLAYER_PREFIX: &str = "sr:player:";
pub const COMPETITOR_PREFIX: &str = "sr:competitor:";

const VARIANT_KEY: &str = "variant";
const PLAYER_KEY: &str = "player";
const REPLAY_PREFIX: &str = "replay:";

/// FNV-1a, 32 bit.
pub fn hash32(s: &str) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    s.bytes()
        .fold(OFFSET_BASIS, |h, b| (h ^ u32::from(b)).wrapping_mul(PRIME))
}

/// Ordered market specifier map (`key=value|key=value`).
///
/// Keys keep the order in which they first appeared; a repeated key keeps its
/// first position and takes the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Specifiers(Vec<(String, String)>);

impl Specifiers {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The `variant` specifier with any `replay:` prefix removed.
    pub fn variant(&self) -> Option<&str> {
        self.get(VARIANT_KEY).map(variant_specifier)
    }

    fn insert(&mut self, key: &str, value: &str) {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.0.push((key.to_string(), value.to_string())),
        }
    }
}

impl fmt::Display for Specifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

impl FromStr for Specifiers {
    type Err = std::convert::Infallible;

    /// Parses the canonical `key=value|key=value` form; malformed segments are
    /// skipped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(to_specifiers(s, "").unwrap_or_default())
    }
}

/// Serialised as the canonical string so key order survives consumers that
/// parse JSON objects into sorted maps.
impl Serialize for Specifiers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Specifiers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SpecifiersVisitor;

        impl<'de> Visitor<'de> for SpecifiersVisitor {
            type Value = Specifiers;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a `key=value|key=value` specifier string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Specifiers, E> {
                Ok(v.parse().unwrap_or_default())
            }
        }

        deserializer.deserialize_str(SpecifiersVisitor)
    }
}

/// Line ids of a market: with every specifier, and with `variant` left out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineIds {
    pub line_id: u32,
    pub no_variant_line_id: u32,
}

fn segments(s: &str) -> impl Iterator<Item = (&str, &str)> {
    s.split('|').filter_map(|segment| {
        let (key, value) = segment.split_once('=')?;
        if value.contains('=') {
            return None;
        }
        Some((key, value))
    })
}

fn join_specifiers(base: &str, extended: &str) -> String {
    if extended.is_empty() {
        base.to_string()
    } else {
        format!("{base}|{extended}")
    }
}

/// Parses base and extended specifier strings into one ordered map.
///
/// Segments that are not exactly `key=value` are skipped. The value of
/// `player` loses its `sr:player:` prefix. Returns `None` when nothing
/// parseable is present.
pub fn to_specifiers(base: &str, extended: &str) -> Option<Specifiers> {
    let all = join_specifiers(base, extended);
    if all.len() < 2 {
        return None;
    }
    let mut specifiers = Specifiers::default();
    for (key, value) in segments(&all) {
        let value = if key == PLAYER_KEY {
            value.strip_prefix(PLAYER_PREFIX).unwrap_or(value)
        } else {
            value
        };
        specifiers.insert(key, value);
    }
    (!specifiers.is_empty()).then_some(specifiers)
}

/// Line id of a raw base specifier string; 0 when the market has none.
pub fn to_line_id(specifiers: &str) -> u32 {
    if specifiers.is_empty() {
        0
    } else {
        hash32(specifiers)
    }
}

/// Line id of the base specifier string with the `variant` segment removed.
pub fn no_variant_line_id(specifiers: &str) -> u32 {
    let rest: Vec<&str> = specifiers
        .split('|')
        .filter(|segment| {
            segment
                .split_once('=')
                .map_or(true, |(key, _)| key != VARIANT_KEY)
        })
        .collect();
    to_line_id(&rest.join("|"))
}

/// Parsed specifiers together with both line ids. Only `base` feeds the ids.
pub fn to_specifiers_line_id(base: &str, extended: &str) -> (Option<Specifiers>, LineIds) {
    let ids = LineIds {
        line_id: to_line_id(base),
        no_variant_line_id: no_variant_line_id(base),
    };
    (to_specifiers(base, extended), ids)
}

pub fn variant_specifier(variant: &str) -> &str {
    variant.strip_prefix(REPLAY_PREFIX).unwrap_or(variant)
}

pub fn to_variant_id(variant: &str) -> u32 {
    if variant.is_empty() {
        0
    } else {
        hash32(variant)
    }
}

/// Outcome id: the numeric player id for player outcomes (0 when the player
/// id is malformed), the literal value for integers, a hash otherwise.
pub fn to_outcome_id(id: &str) -> i64 {
    if id.starts_with(PLAYER_PREFIX) {
        return to_player_id(id).unwrap_or(0);
    }
    id.parse::<i64>().unwrap_or_else(|_| i64::from(hash32(id)))
}

pub fn to_player_id(id: &str) -> Option<i64> {
    id.strip_prefix(PLAYER_PREFIX)?.parse().ok()
}

/// Competitor ids named by a composite outcome id such as
/// `sr:competitor:1,sr:competitor:2`.
pub fn to_competitors(id: &str) -> Option<Vec<i64>> {
    if !id.contains(COMPETITOR_PREFIX) {
        return None;
    }
    let ids: Vec<i64> = id
        .split(',')
        .filter_map(|part| part.trim().strip_prefix(COMPETITOR_PREFIX)?.parse().ok())
        .collect();
    (!ids.is_empty()).then_some(ids)
}
