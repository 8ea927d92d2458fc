//! Player stats models: the raw remote payload and its normalized form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shape of one consumed field in a player payload.
///
/// The remote API is inconsistent about types, so every field lands in one
/// of these buckets and the normalizer decides what each bucket is worth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawField {
    Number(f64),
    Counters(Map<String, Value>),
    Other(Value),
}

impl RawField {
    /// Short name of the JSON type, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            RawField::Number(_) => "number",
            RawField::Counters(_) => "object",
            RawField::Other(v) => json_kind(v),
        }
    }
}

/// Player stats as returned by `/players/getPlayer`.
///
/// Only the consumed keys are kept; everything else in the payload is
/// ignored. `null` and missing keys both become `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlayerStatsRaw {
    #[serde(default)]
    pub level: Option<RawField>,

    #[serde(default, rename = "killsELO")]
    pub kills_elo: Option<RawField>,

    #[serde(default, rename = "gamesELO")]
    pub games_elo: Option<RawField>,

    #[serde(default)]
    pub wins: Option<RawField>,

    #[serde(default)]
    pub losses: Option<RawField>,

    #[serde(default)]
    pub kills_per_vehicle: Option<RawField>,

    #[serde(default)]
    pub kills_per_weapon: Option<RawField>,

    #[serde(default)]
    pub deaths: Option<RawField>,

    #[serde(default)]
    pub coins: Option<RawField>,

    /// Set when the payload itself was not a JSON object.
    #[serde(skip)]
    pub payload_kind: Option<&'static str>,
}

impl PlayerStatsRaw {
    /// Build from an arbitrary JSON body. Never fails.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(_) => serde_json::from_value(value).unwrap_or_default(),
            other => Self {
                payload_kind: Some(json_kind(&other)),
                ..Default::default()
            },
        }
    }
}

/// Numeric view of one player, with zero for anything unusable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPlayerMetrics {
    pub level: f64,
    #[serde(rename = "killsELO")]
    pub kills_elo: f64,
    #[serde(rename = "gamesELO")]
    pub games_elo: f64,
    pub wins: i64,
    pub losses: i64,
    pub kills_per_vehicle: i64,
    pub kills_per_weapon: i64,
    pub deaths: i64,
    pub coins: i64,
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
