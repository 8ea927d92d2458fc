//! Ranking pipeline orchestrator.
//!
//! One run walks the remote data strictly sequentially:
//! 1. Fetch the squad list (failure aborts the run)
//! 2. For each squad, fetch its members (failure skips the squad)
//! 3. For each member with a uid, fetch and normalize stats (failure skips the member)
//! 4. Aggregate the squad and fold the result into the run's accumulator
//! 5. Build the snapshot and hand it to the writer

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::aggregate::aggregate;
use crate::config::{AggregationConfig, ZeroMemberPolicy};
use crate::fetch::{FetchError, StatsSource, Throttle};
use crate::models::{NormalizedPlayerMetrics, RankingSnapshot, SquadAggregate, SquadName};
use crate::normalize::normalize_with_notes;
use crate::storage::{SnapshotWriter, StorageError};

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to fetch squad list: {0}")]
    SquadList(#[source] FetchError),

    #[error("Failed to write snapshot: {source}")]
    Storage {
        #[source]
        source: StorageError,
        /// What the run computed before the write failed.
        summary: Box<RunSummary>,
    },
}

/// Why a squad has no entry in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The members call failed.
    MembersUnavailable(String),
    /// The members call returned an empty or non-list body.
    NoMembers,
    /// No member produced stats and the zero-member policy is `Omit`.
    NoValidMembers,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MembersUnavailable(e) => write!(f, "members unavailable ({})", e),
            SkipReason::NoMembers => write!(f, "no members"),
            SkipReason::NoValidMembers => write!(f, "no member stats"),
        }
    }
}

/// Result of processing one squad.
#[derive(Debug, Clone, PartialEq)]
pub enum SquadOutcome {
    Aggregated(SquadAggregate),
    Skipped(SkipReason),
}

/// Everything one squad contributes to a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SquadReport {
    pub squad: SquadName,
    pub outcome: SquadOutcome,
    pub remote_calls: u32,
    pub players_fetched: u32,
    pub players_failed: u32,
    pub members_without_uid: u32,
    pub malformed_fields: u32,
}

impl SquadReport {
    fn new(squad: SquadName) -> Self {
        Self {
            squad,
            outcome: SquadOutcome::Skipped(SkipReason::NoMembers),
            remote_calls: 0,
            players_fetched: 0,
            players_failed: 0,
            members_without_uid: 0,
            malformed_fields: 0,
        }
    }
}

/// Operator-facing counters for a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub squads_discovered: u32,
    pub squads_processed: u32,
    pub squads_skipped: u32,
    pub players_fetched: u32,
    pub players_failed: u32,
    pub members_without_uid: u32,
    pub malformed_fields: u32,
    /// Every remote call attempted, including the squad list and failures.
    pub remote_calls: u32,
    pub duration: Duration,
}

/// Accumulates squad reports into the snapshot contents.
#[derive(Debug, Default)]
pub struct RankingAccumulator {
    squad_stats: BTreeMap<SquadName, SquadAggregate>,
    summary: RunSummary,
}

impl RankingAccumulator {
    /// Start a run that discovered `squads_discovered` squads with one
    /// squad list call.
    pub fn new(squads_discovered: usize) -> Self {
        Self {
            squad_stats: BTreeMap::new(),
            summary: RunSummary {
                squads_discovered: u32::try_from(squads_discovered).unwrap_or(u32::MAX),
                remote_calls: 1,
                ..Default::default()
            },
        }
    }

    pub fn record(&mut self, report: SquadReport) {
        let summary = &mut self.summary;
        summary.remote_calls += report.remote_calls;
        summary.players_fetched += report.players_fetched;
        summary.players_failed += report.players_failed;
        summary.members_without_uid += report.members_without_uid;
        summary.malformed_fields += report.malformed_fields;

        match report.outcome {
            SquadOutcome::Aggregated(aggregate) => {
                summary.squads_processed += 1;
                self.squad_stats.insert(report.squad, aggregate);
            }
            SquadOutcome::Skipped(_) => summary.squads_skipped += 1,
        }
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Close the run, stamping the snapshot with `at`.
    pub fn finish(self, at: DateTime<Utc>, elapsed: Duration) -> (RankingSnapshot, RunSummary) {
        let mut summary = self.summary;
        summary.duration = elapsed;
        (RankingSnapshot::new(self.squad_stats, at), summary)
    }
}

/// Drives one fetch-aggregate-persist run against a [`StatsSource`].
pub struct RankingPipeline<S> {
    source: S,
    throttle: Throttle,
    aggregation: AggregationConfig,
}

impl<S: StatsSource> RankingPipeline<S> {
    pub fn new(source: S, throttle: Throttle, aggregation: AggregationConfig) -> Self {
        Self {
            source,
            throttle,
            aggregation,
        }
    }

    /// Fetch and aggregate everything, without writing.
    pub async fn collect(&self) -> Result<(RankingSnapshot, RunSummary), PipelineError> {
        let start = Instant::now();
        info!("Fetching squad list");

        let squads = self.source.list_squads().await.map_err(|e| {
            error!("Error fetching squad list: {}", e);
            PipelineError::SquadList(e)
        })?;
        info!("Fetched {} squads", squads.len());

        let mut accumulator = RankingAccumulator::new(squads.len());

        for (i, squad) in squads.iter().enumerate() {
            if i > 0 {
                self.throttle.after_squad().await;
            }

            info!("Processing squad: {}", squad);
            let report = self.process_squad(squad).await;
            match &report.outcome {
                SquadOutcome::Aggregated(_) => info!(
                    "Done processing {} ({} players, {} failed)",
                    squad, report.players_fetched, report.players_failed
                ),
                SquadOutcome::Skipped(reason) => warn!("Skipping squad {}: {}", squad, reason),
            }
            accumulator.record(report);
            debug!(
                "{} remote calls so far",
                accumulator.summary().remote_calls
            );
        }

        let (snapshot, summary) = accumulator.finish(Utc::now(), start.elapsed());
        info!(
            "Collected {} squads with {} remote calls in {:?}",
            summary.squads_processed, summary.remote_calls, summary.duration
        );
        Ok((snapshot, summary))
    }

    /// Collect and write the snapshot.
    pub async fn run(&self, writer: &SnapshotWriter) -> Result<RunSummary, PipelineError> {
        let (snapshot, summary) = self.collect().await?;

        match writer.write(&snapshot) {
            Ok(()) => Ok(summary),
            Err(source) => {
                error!("Snapshot not updated: {}", source);
                Err(PipelineError::Storage {
                    source,
                    summary: Box::new(summary),
                })
            }
        }
    }

    /// Fetch, normalize and aggregate one squad. Never fails; problems are
    /// reported through the returned [`SquadReport`].
    pub async fn process_squad(&self, squad: &SquadName) -> SquadReport {
        let mut report = SquadReport::new(squad.clone());

        report.remote_calls += 1;
        let members = match self.source.list_members(squad).await {
            Ok(members) => members,
            Err(e) => {
                report.outcome =
                    SquadOutcome::Skipped(SkipReason::MembersUnavailable(e.to_string()));
                return report;
            }
        };

        if members.is_empty() {
            report.outcome = SquadOutcome::Skipped(SkipReason::NoMembers);
            return report;
        }

        let mut metrics: Vec<NormalizedPlayerMetrics> = Vec::with_capacity(members.len());

        for member in &members {
            let Some(uid) = member.usable_uid() else {
                report.members_without_uid += 1;
                continue;
            };

            report.remote_calls += 1;
            match self.source.get_player_stats(uid).await {
                Ok(raw) => {
                    let normalized = normalize_with_notes(&raw);
                    for note in &normalized.notes {
                        warn!("Player {} in {}: {}", uid, squad, note);
                    }
                    report.malformed_fields += normalized.notes.len() as u32;
                    report.players_fetched += 1;
                    metrics.push(normalized.metrics);
                }
                Err(e) => {
                    warn!("Failed to fetch stats for player {}: {}", uid, e);
                    report.players_failed += 1;
                }
            }

            self.throttle.after_player().await;
        }

        if metrics.is_empty() && self.aggregation.zero_member_policy == ZeroMemberPolicy::Omit {
            report.outcome = SquadOutcome::Skipped(SkipReason::NoValidMembers);
            return report;
        }

        debug!("Aggregating {} players for {}", metrics.len(), squad);
        let aggregate = aggregate(&metrics, &self.aggregation.extra_fields);
        for field in &self.aggregation.extra_fields {
            debug!("{} {}: {:?}", squad, field, aggregate.extra(*field));
        }
        report.outcome = SquadOutcome::Aggregated(aggregate);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtraField, MemberRef, PlayerStatsRaw};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// In-memory stats source. Missing entries fail like an HTTP 500.
    #[derive(Default)]
    struct MockSource {
        squads: Option<Vec<&'static str>>,
        members: HashMap<&'static str, Vec<MemberRef>>,
        players: HashMap<&'static str, Value>,
        calls: AtomicU32,
    }

    impl MockSource {
        fn new(squads: Vec<&'static str>) -> Self {
            Self {
                squads: Some(squads),
                ..Default::default()
            }
        }

        fn members(mut self, squad: &'static str, uids: &[&str]) -> Self {
            self.members
                .insert(squad, uids.iter().map(|uid| MemberRef::new(*uid)).collect());
            self
        }

        fn member_refs(mut self, squad: &'static str, members: Vec<MemberRef>) -> Self {
            self.members.insert(squad, members);
            self
        }

        fn player(mut self, uid: &'static str, stats: Value) -> Self {
            self.players.insert(uid, stats);
            self
        }

        fn unavailable() -> FetchError {
            FetchError::HttpStatus {
                status: 500,
                message: "Internal Server Error".to_string(),
            }
        }
    }

    #[async_trait]
    impl StatsSource for MockSource {
        async fn list_squads(&self) -> Result<Vec<SquadName>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.squads
                .as_ref()
                .map(|squads| squads.iter().map(|s| SquadName::from(*s)).collect())
                .ok_or_else(Self::unavailable)
        }

        async fn list_members(&self, squad: &SquadName) -> Result<Vec<MemberRef>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.members
                .get(squad.as_str())
                .cloned()
                .ok_or_else(Self::unavailable)
        }

        async fn get_player_stats(&self, uid: &str) -> Result<PlayerStatsRaw, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.players
                .get(uid)
                .cloned()
                .map(PlayerStatsRaw::from_value)
                .ok_or_else(Self::unavailable)
        }
    }

    fn pipeline(source: MockSource) -> RankingPipeline<MockSource> {
        RankingPipeline::new(source, Throttle::disabled(), AggregationConfig::default())
    }

    fn alpha_team() -> MockSource {
        MockSource::new(vec!["Alpha Team"])
            .members("Alpha Team", &["u1", "u2"])
            .player(
                "u1",
                json!({"level": 10, "killsELO": 1500, "gamesELO": 1200, "wins": {"m00": 5}, "losses": {"m00": 2}}),
            )
            .player(
                "u2",
                json!({"level": 20, "killsELO": 1700, "gamesELO": 1300, "wins": {"m00": 3}, "losses": {"m00": 1}}),
            )
    }

    fn player_stats(level: i64) -> Value {
        json!({"level": level, "killsELO": 1000, "gamesELO": 1000, "wins": {"m00": 1}, "losses": {"m00": 1}})
    }

    #[tokio::test]
    async fn test_end_to_end_alpha_team() {
        let (snapshot, summary) = pipeline(alpha_team()).collect().await.unwrap();

        assert_eq!(
            serde_json::to_value(&snapshot.squad_stats).unwrap(),
            json!({
                "Alpha Team": {
                    "level": 15.0,
                    "killsELO": 1600.0,
                    "gamesELO": 1250.0,
                    "wins": 8,
                    "losses": 3
                }
            })
        );
        assert_eq!(summary.squads_discovered, 1);
        assert_eq!(summary.squads_processed, 1);
        assert_eq!(summary.players_fetched, 2);
        assert_eq!(summary.remote_calls, 4);
    }

    #[tokio::test]
    async fn test_malformed_wins_does_not_fail_run() {
        let source = alpha_team().player(
            "u2",
            json!({"level": 20, "killsELO": 1700, "gamesELO": 1300, "wins": "n/a", "losses": {"m00": 1}}),
        );

        let (snapshot, summary) = pipeline(source).collect().await.unwrap();
        let alpha = snapshot.get("Alpha Team").unwrap();

        assert_eq!(alpha.wins, 5);
        assert_eq!(alpha.losses, 3);
        assert_eq!(alpha.level, 15.0);
        assert_eq!(summary.malformed_fields, 1);
    }

    #[tokio::test]
    async fn test_members_failure_skips_only_that_squad() {
        let source = MockSource::new(vec!["Broken", "Bravo"])
            .members("Bravo", &["b1"])
            .player("b1", player_stats(7));

        let (snapshot, summary) = pipeline(source).collect().await.unwrap();

        assert!(snapshot.get("Broken").is_none());
        assert_eq!(snapshot.get("Bravo").unwrap().level, 7.0);
        assert_eq!(summary.squads_skipped, 1);
        assert_eq!(summary.squads_processed, 1);
    }

    #[tokio::test]
    async fn test_player_failure_excludes_only_that_member() {
        let source = MockSource::new(vec!["Five"])
            .members("Five", &["p1", "p2", "p3", "p4", "p5"])
            .player("p1", player_stats(10))
            .player("p2", player_stats(20))
            .player("p4", player_stats(30))
            .player("p5", player_stats(40));

        let (snapshot, summary) = pipeline(source).collect().await.unwrap();
        let five = snapshot.get("Five").unwrap();

        assert_eq!(five.level, 25.0);
        assert_eq!(five.wins, 4);
        assert_eq!(five.losses, 4);
        assert_eq!(summary.players_fetched, 4);
        assert_eq!(summary.players_failed, 1);
        // squad list + members + five players
        assert_eq!(summary.remote_calls, 7);
    }

    #[tokio::test]
    async fn test_empty_member_list_skips_squad() {
        let source = MockSource::new(vec!["Ghost"]).members("Ghost", &[]);
        let (snapshot, summary) = pipeline(source).collect().await.unwrap();

        assert!(snapshot.squad_stats.is_empty());
        assert_eq!(summary.squads_skipped, 1);
    }

    #[tokio::test]
    async fn test_members_without_uid_are_dropped() {
        let source = MockSource::new(vec!["Mixed"])
            .member_refs(
                "Mixed",
                vec![
                    MemberRef::from_value(json!({"name": "anon"})),
                    MemberRef::new("m1"),
                    MemberRef::from_value(json!({"uid": null})),
                ],
            )
            .player("m1", player_stats(12));

        let (snapshot, summary) = pipeline(source).collect().await.unwrap();

        assert_eq!(snapshot.get("Mixed").unwrap().level, 12.0);
        assert_eq!(summary.members_without_uid, 2);
        assert_eq!(summary.remote_calls, 3);
    }

    #[tokio::test]
    async fn test_zero_valid_members_emits_zero_aggregate() {
        let source = MockSource::new(vec!["Down"]).members("Down", &["x1", "x2"]);
        let (snapshot, _) = pipeline(source).collect().await.unwrap();

        assert_eq!(snapshot.get("Down"), Some(&SquadAggregate::default()));
    }

    #[tokio::test]
    async fn test_zero_valid_members_omitted_by_policy() {
        let source = MockSource::new(vec!["Down"]).members("Down", &["x1"]);
        let aggregation = AggregationConfig {
            zero_member_policy: ZeroMemberPolicy::Omit,
            ..Default::default()
        };
        let pipeline = RankingPipeline::new(source, Throttle::disabled(), aggregation);

        let report = pipeline.process_squad(&SquadName::from("Down")).await;
        assert_eq!(
            report.outcome,
            SquadOutcome::Skipped(SkipReason::NoValidMembers)
        );
        assert_eq!(report.players_failed, 1);
    }

    #[tokio::test]
    async fn test_extra_fields_follow_config() {
        let source = MockSource::new(vec!["Extra"])
            .members("Extra", &["e1", "e2"])
            .player("e1", json!({"deaths": {"a": 2, "b": 3}, "coins": 10}))
            .player("e2", json!({"deaths": "none", "coins": 5, "kills_per_weapon": {"x": 4}}));
        let aggregation = AggregationConfig {
            extra_fields: ExtraField::ALL.to_vec(),
            ..Default::default()
        };
        let pipeline = RankingPipeline::new(source, Throttle::disabled(), aggregation);

        let (snapshot, _) = pipeline.collect().await.unwrap();
        let extra = snapshot.get("Extra").unwrap();

        assert_eq!(extra.deaths, Some(5));
        assert_eq!(extra.coins, Some(15));
        assert_eq!(extra.kills_per_weapon, Some(4));
        assert_eq!(extra.kills_per_vehicle, Some(0));
    }

    #[tokio::test]
    async fn test_squad_list_failure_aborts_without_writing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("squad_rankings.json");
        std::fs::write(&path, "previous").unwrap();

        let source = MockSource::default();
        let result = pipeline(source).run(&SnapshotWriter::new(&path)).await;

        assert!(matches!(result, Err(PipelineError::SquadList(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous");
    }

    #[tokio::test]
    async fn test_run_writes_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("squad_rankings.json");

        let summary = pipeline(alpha_team())
            .run(&SnapshotWriter::new(&path))
            .await
            .unwrap();

        let written = crate::storage::read_snapshot(&path).unwrap().unwrap();
        assert_eq!(written.get("Alpha Team").unwrap().wins, 8);
        assert!(written.last_updated > 0.0);
        assert_eq!(summary.squads_processed, 1);
    }

    #[tokio::test]
    async fn test_write_failure_is_reported_with_summary() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();

        let result = pipeline(alpha_team())
            .run(&SnapshotWriter::new(blocker.join("rankings.json")))
            .await;

        match result {
            Err(PipelineError::Storage { summary, .. }) => {
                assert_eq!(summary.squads_processed, 1);
            }
            other => panic!("Expected storage error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_two_runs_produce_identical_squad_stats() {
        let mut source = alpha_team()
            .members("Bravo", &["b1", "b2", "b3"])
            .player("b1", json!({"level": 0.1, "killsELO": 0.2, "gamesELO": 0.3}))
            .player("b2", json!({"level": 0.7, "killsELO": "?", "wins": {"m00": 2}}))
            .player("b3", json!({"level": 1e-3}));
        source.squads = Some(vec!["Alpha Team", "Bravo"]);
        let pipeline = pipeline(source);

        let (first, _) = pipeline.collect().await.unwrap();
        let (second, _) = pipeline.collect().await.unwrap();

        assert_eq!(
            serde_json::to_string(&first.squad_stats).unwrap(),
            serde_json::to_string(&second.squad_stats).unwrap()
        );
        assert_eq!(first.squad_count(), 2);
        // two runs of: squad list + 2 member lists + 5 players
        assert_eq!(pipeline.source.calls.load(Ordering::SeqCst), 16);
    }

    #[tokio::test]
    async fn test_huge_levels_round_trip_through_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("squad_rankings.json");
        let source = MockSource::new(vec!["Giants"])
            .members("Giants", &["g1", "g2"])
            .player("g1", json!({"level": 1.5e308}))
            .player("g2", json!({"level": 1.5e308}));

        pipeline(source).run(&SnapshotWriter::new(&path)).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("null"));
        let written = crate::storage::read_snapshot(&path).unwrap().unwrap();
        assert_eq!(written.get("Giants").unwrap().level, 1.5e308);
    }

    #[tokio::test]
    async fn test_throttle_runs_after_every_player_call_and_between_squads() {
        let source = MockSource::new(vec!["First", "Second"])
            .members("First", &["f1", "missing"])
            .members("Second", &["s1"])
            .player("f1", player_stats(1))
            .player("s1", player_stats(2));
        let throttle = Throttle::new(Duration::from_millis(20), Duration::from_millis(50));
        let pipeline = RankingPipeline::new(source, throttle, AggregationConfig::default());

        let start = Instant::now();
        let (snapshot, summary) = pipeline.collect().await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(summary.players_failed, 1);
        assert_eq!(snapshot.squad_count(), 2);
        // three player calls (one failed) and one gap between the two squads
        assert!(
            elapsed >= Duration::from_millis(3 * 20 + 50),
            "elapsed {:?}",
            elapsed
        );
    }

    #[test]
    fn test_accumulator_counts() {
        let mut accumulator = RankingAccumulator::new(2);

        let mut processed = SquadReport::new(SquadName::from("A"));
        processed.outcome = SquadOutcome::Aggregated(SquadAggregate::default());
        processed.remote_calls = 3;
        processed.players_fetched = 2;
        accumulator.record(processed);

        let mut skipped = SquadReport::new(SquadName::from("B"));
        skipped.remote_calls = 1;
        skipped.outcome = SquadOutcome::Skipped(SkipReason::MembersUnavailable("HTTP 500".into()));
        accumulator.record(skipped);

        assert_eq!(accumulator.summary().remote_calls, 5);

        let (snapshot, summary) = accumulator.finish(Utc::now(), Duration::from_secs(1));
        assert_eq!(snapshot.squad_count(), 1);
        assert_eq!(summary.squads_processed, 1);
        assert_eq!(summary.squads_skipped, 1);
        assert_eq!(summary.players_fetched, 2);
        assert_eq!(summary.duration, Duration::from_secs(1));
    }
}
