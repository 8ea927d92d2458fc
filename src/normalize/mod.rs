//! Player record normalization.
//!
//! Turns a loosely-typed [`PlayerStatsRaw`] into [`NormalizedPlayerMetrics`].
//! This is the only place that inspects payload shapes. Every malformed or
//! missing value degrades to zero and, where something was present but
//! unusable, a [`MalformedDataError`] note. Normalization never fails.

use serde_json::Value;
use thiserror::Error;

use crate::models::{json_kind, NormalizedPlayerMetrics, PlayerStatsRaw, RawField};

/// Sub-key of `wins` / `losses` holding the counted category.
pub const COUNTER_KEY: &str = "m00";

/// A field whose shape did not match what the normalizer expects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field `{field}` has unexpected shape: expected {expected}, found {found}")]
pub struct MalformedDataError {
    pub field: String,
    pub expected: &'static str,
    pub found: &'static str,
}

impl MalformedDataError {
    fn new(field: impl Into<String>, expected: &'static str, found: &'static str) -> Self {
        Self {
            field: field.into(),
            expected,
            found,
        }
    }
}

/// Normalized metrics plus any shape problems seen along the way.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub metrics: NormalizedPlayerMetrics,
    pub notes: Vec<MalformedDataError>,
}

/// Normalize a player payload, discarding diagnostics.
pub fn normalize(raw: &PlayerStatsRaw) -> NormalizedPlayerMetrics {
    normalize_with_notes(raw).metrics
}

/// Normalize a player payload and keep the diagnostics.
pub fn normalize_with_notes(raw: &PlayerStatsRaw) -> Normalized {
    let mut notes = Vec::new();

    if let Some(found) = raw.payload_kind {
        notes.push(MalformedDataError::new("<payload>", "object", found));
    }

    let metrics = NormalizedPlayerMetrics {
        level: scalar("level", raw.level.as_ref(), &mut notes),
        kills_elo: scalar("killsELO", raw.kills_elo.as_ref(), &mut notes),
        games_elo: scalar("gamesELO", raw.games_elo.as_ref(), &mut notes),
        wins: counter("wins", raw.wins.as_ref(), &mut notes),
        losses: counter("losses", raw.losses.as_ref(), &mut notes),
        kills_per_vehicle: counter_sum(
            "kills_per_vehicle",
            raw.kills_per_vehicle.as_ref(),
            &mut notes,
        ),
        kills_per_weapon: counter_sum(
            "kills_per_weapon",
            raw.kills_per_weapon.as_ref(),
            &mut notes,
        ),
        deaths: counter_sum("deaths", raw.deaths.as_ref(), &mut notes),
        coins: truncate(scalar("coins", raw.coins.as_ref(), &mut notes)),
    };

    Normalized { metrics, notes }
}

/// Plain numeric field.
fn scalar(name: &str, field: Option<&RawField>, notes: &mut Vec<MalformedDataError>) -> f64 {
    match field {
        None => 0.0,
        Some(RawField::Number(n)) if n.is_finite() => *n,
        Some(other) => {
            notes.push(MalformedDataError::new(name, "number", other.kind()));
            0.0
        }
    }
}

/// Mapping whose `m00` entry is the count.
fn counter(name: &str, field: Option<&RawField>, notes: &mut Vec<MalformedDataError>) -> i64 {
    match field {
        None => 0,
        Some(RawField::Counters(map)) => match map.get(COUNTER_KEY) {
            None | Some(Value::Null) => 0,
            Some(value) => integer(value).unwrap_or_else(|| {
                notes.push(MalformedDataError::new(
                    format!("{name}.{COUNTER_KEY}"),
                    "integer",
                    json_kind(value),
                ));
                0
            }),
        },
        Some(other) => {
            notes.push(MalformedDataError::new(name, "object", other.kind()));
            0
        }
    }
}

/// Mapping of sub-category to count; every numeric value is summed.
fn counter_sum(name: &str, field: Option<&RawField>, notes: &mut Vec<MalformedDataError>) -> i64 {
    match field {
        None => 0,
        Some(RawField::Counters(map)) => map.iter().fold(0i64, |total, (key, value)| {
            match integer(value) {
                Some(n) => total.saturating_add(n),
                None => {
                    notes.push(MalformedDataError::new(
                        format!("{name}.{key}"),
                        "integer",
                        json_kind(value),
                    ));
                    total
                }
            }
        }),
        Some(other) => {
            notes.push(MalformedDataError::new(name, "object", other.kind()));
            0
        }
    }
}

fn integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_u64().map(|n| i64::try_from(n).unwrap_or(i64::MAX)))
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(truncate))
}

fn truncate(value: f64) -> i64 {
    // `as` saturates at the i64 bounds
    value.trunc() as i64
}
