//! Squad aggregates and the ranking snapshot document.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NormalizedPlayerMetrics, SquadName};

/// Optional count fields that can be summed into a squad aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtraField {
    KillsPerVehicle,
    KillsPerWeapon,
    Deaths,
    Coins,
}

impl ExtraField {
    pub const ALL: [ExtraField; 4] = [
        ExtraField::KillsPerVehicle,
        ExtraField::KillsPerWeapon,
        ExtraField::Deaths,
        ExtraField::Coins,
    ];

    /// Key used in the snapshot JSON.
    pub fn key(&self) -> &'static str {
        match self {
            ExtraField::KillsPerVehicle => "kills_per_vehicle",
            ExtraField::KillsPerWeapon => "kills_per_weapon",
            ExtraField::Deaths => "deaths",
            ExtraField::Coins => "coins",
        }
    }

    /// This field's value for one player.
    pub fn value_of(&self, metrics: &NormalizedPlayerMetrics) -> i64 {
        match self {
            ExtraField::KillsPerVehicle => metrics.kills_per_vehicle,
            ExtraField::KillsPerWeapon => metrics.kills_per_weapon,
            ExtraField::Deaths => metrics.deaths,
            ExtraField::Coins => metrics.coins,
        }
    }
}

impl fmt::Display for ExtraField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Per-squad ranking entry.
///
/// Rate-like metrics are means over members, counts are sums. Extra fields
/// are only present when enabled in configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SquadAggregate {
    pub level: f64,
    #[serde(rename = "killsELO")]
    pub kills_elo: f64,
    #[serde(rename = "gamesELO")]
    pub games_elo: f64,
    pub wins: i64,
    pub losses: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kills_per_vehicle: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kills_per_weapon: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deaths: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coins: Option<i64>,
}

impl SquadAggregate {
    pub fn extra(&self, field: ExtraField) -> Option<i64> {
        match field {
            ExtraField::KillsPerVehicle => self.kills_per_vehicle,
            ExtraField::KillsPerWeapon => self.kills_per_weapon,
            ExtraField::Deaths => self.deaths,
            ExtraField::Coins => self.coins,
        }
    }

    pub fn set_extra(&mut self, field: ExtraField, value: i64) {
        let slot = match field {
            ExtraField::KillsPerVehicle => &mut self.kills_per_vehicle,
            ExtraField::KillsPerWeapon => &mut self.kills_per_weapon,
            ExtraField::Deaths => &mut self.deaths,
            ExtraField::Coins => &mut self.coins,
        };
        *slot = Some(value);
    }
}

/// The complete output of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSnapshot {
    /// Unix seconds (UTC, fractional) at which the run completed.
    pub last_updated: f64,

    /// Aggregates keyed by squad name, ordered by name.
    pub squad_stats: BTreeMap<SquadName, SquadAggregate>,
}

impl RankingSnapshot {
    pub fn new(squad_stats: BTreeMap<SquadName, SquadAggregate>, at: DateTime<Utc>) -> Self {
        Self {
            last_updated: unix_seconds(at),
            squad_stats,
        }
    }

    pub fn squad_count(&self) -> usize {
        self.squad_stats.len()
    }

    pub fn get(&self, squad: &str) -> Option<&SquadAggregate> {
        self.squad_stats.get(&SquadName::from(squad))
    }
}

/// Fractional unix seconds with microsecond resolution.
pub fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}
