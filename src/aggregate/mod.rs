//! Squad aggregation.
//!
//! Folds a squad's normalized player metrics into one [`SquadAggregate`]:
//! - `level`, `killsELO`, `gamesELO` are means over members
//! - `wins`, `losses` and enabled extra fields are sums
//!
//! Reductions always run left to right over the input slice so the same
//! input order gives bit-identical output.

use crate::models::{ExtraField, NormalizedPlayerMetrics, SquadAggregate};

/// Aggregate one squad's members.
///
/// An empty slice yields the all-zero aggregate, with every enabled extra
/// field present as `0`.
pub fn aggregate(members: &[NormalizedPlayerMetrics], extras: &[ExtraField]) -> SquadAggregate {
    let mut aggregate = SquadAggregate {
        level: mean(members, |m| m.level),
        kills_elo: mean(members, |m| m.kills_elo),
        games_elo: mean(members, |m| m.games_elo),
        wins: sum(members, |m| m.wins),
        losses: sum(members, |m| m.losses),
        ..Default::default()
    };

    for field in extras {
        aggregate.set_extra(*field, sum(members, |m| field.value_of(m)));
    }

    aggregate
}

/// Arithmetic mean; 0.0 for an empty slice.
///
/// Always finite. When the plain sum overflows, each term is scaled by the
/// member count before folding, and anything still out of range is clamped
/// to the largest finite value of the same sign.
pub fn mean<F>(members: &[NormalizedPlayerMetrics], value: F) -> f64
where
    F: Fn(&NormalizedPlayerMetrics) -> f64,
{
    if members.is_empty() {
        return 0.0;
    }
    let n = members.len() as f64;
    let total = members.iter().fold(0.0, |acc, m| acc + value(m));
    if total.is_finite() {
        return total / n;
    }

    let scaled = members.iter().fold(0.0, |acc, m| acc + value(m) / n);
    if scaled.is_nan() {
        0.0
    } else {
        scaled.clamp(f64::MIN, f64::MAX)
    }
}

/// Saturating integer sum.
pub fn sum<F>(members: &[NormalizedPlayerMetrics], value: F) -> i64
where
    F: Fn(&NormalizedPlayerMetrics) -> i64,
{
    members
        .iter()
        .fold(0i64, |acc, m| acc.saturating_add(value(m)))
}
