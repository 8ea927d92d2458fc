use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use squad_rankings::config::AppConfig;
use squad_rankings::fetch::StatsClient;
use squad_rankings::pipeline::{PipelineError, RankingPipeline, RunSummary};
use squad_rankings::storage::{read_snapshot, SnapshotWriter};

#[derive(Parser)]
#[command(name = "squad-rankings")]
#[command(about = "Fetch squad and player stats and write the ranking snapshot")]
#[command(version)]
struct Cli {
    /// Path to configuration file (defaults are used if it does not exist)
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,

    /// Snapshot output path (overrides the config file)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    if let Some(output) = cli.output {
        config.output_path = output;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    config.validate()?;

    init_tracing(&config.log_level, cli.json_logs);
    tracing::info!("Starting squad-rankings v{}", env!("CARGO_PKG_VERSION"));

    match read_snapshot(&config.output_path) {
        Ok(Some(previous)) => tracing::info!(
            "Previous snapshot has {} squads (last_updated {})",
            previous.squad_count(),
            previous.last_updated
        ),
        Ok(None) => tracing::info!("No previous snapshot at {:?}", config.output_path),
        Err(e) => tracing::warn!("Previous snapshot unreadable, it will be replaced: {}", e),
    }

    let client =
        StatsClient::new(config.api.client_config()).context("Failed to build HTTP client")?;
    let throttle = config.throttle.throttle();
    tracing::info!(
        "Throttle: {:?} after each player, {:?} between squads",
        throttle.member_delay(),
        throttle.squad_delay()
    );
    let pipeline = RankingPipeline::new(client, throttle, config.aggregation.clone());
    let writer = SnapshotWriter::new(&config.output_path);

    match pipeline.run(&writer).await {
        Ok(summary) => {
            print_summary(&summary);
            println!(
                "\nSuccessfully generated {} with data for {} squads.",
                writer.path().display(),
                summary.squads_processed
            );
            Ok(())
        }
        Err(PipelineError::Storage { source, summary }) => {
            print_summary(&summary);
            println!("\nSnapshot NOT updated: {}", writer.path().display());
            Err(source).context("Failed to write snapshot")
        }
        Err(e @ PipelineError::SquadList(_)) => {
            println!("\nRun aborted, no snapshot written.");
            Err(e.into())
        }
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn print_summary(summary: &RunSummary) {
    println!("\n=== Ranking Results ===");
    println!("Squads discovered:   {}", summary.squads_discovered);
    println!("Squads processed:    {}", summary.squads_processed);
    println!("Squads skipped:      {}", summary.squads_skipped);
    println!("Players fetched:     {}", summary.players_fetched);
    println!("Players failed:      {}", summary.players_failed);
    println!("Members without uid: {}", summary.members_without_uid);
    println!("Malformed fields:    {}", summary.malformed_fields);
    println!("Total API calls:     {}", summary.remote_calls);
    println!("Duration:            {:?}", summary.duration);
}
