//! osmviews statistics builder.
//!
//! Reads an assembled view-count raster and writes the view statistics
//! (median and thinned rank/value curve) plus, optionally, the log-rank
//! ranges used to quantize the published raster.

mod output;
mod pipeline;

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use rank_stats::BuildConfig;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use output::{write_json_atomic, RanksArtifact};

#[derive(Parser, Debug)]
#[command(name = "osmviews-stats")]
#[command(about = "Build rank buckets and view statistics from an osmviews raster")]
struct Args {
    /// Input raster (tiled float32 TIFF)
    #[arg(short, long)]
    input: PathBuf,

    /// Where to write the statistics JSON
    #[arg(long, default_value = "osmviews-stats.json")]
    stats_output: PathBuf,

    /// Where to write the rank ranges JSON (skipped when absent)
    #[arg(long)]
    ranks_output: Option<PathBuf>,

    /// Random seed (overrides RANDOM_SEED; default: time based)
    #[arg(long)]
    seed: Option<u64>,

    /// Quantizer workers (overrides RANK_WORKERS; 0 = one per CPU)
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting osmviews statistics builder");

    let mut config = BuildConfig::from_env();
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    let seed = *config
        .seed
        .get_or_insert_with(|| Utc::now().timestamp_micros() as u64);
    config.validate()?;

    info!(
        num_buckets = config.num_buckets,
        workers = config.effective_workers(),
        queue_capacity = config.queue_capacity,
        seed = seed,
        "Loaded configuration"
    );

    let outputs = pipeline::run_build(&args.input, &config).await?;

    write_json_atomic(&args.stats_output, &outputs.stats)?;
    info!(path = %args.stats_output.display(), "Wrote statistics");

    if let Some(path) = &args.ranks_output {
        let ranks = RanksArtifact::new(&args.input, seed, &outputs.buckets);
        write_json_atomic(path, &ranks)?;
        info!(path = %path.display(), ranges = ranks.ranges.len(), "Wrote rank ranges");
    }

    Ok(())
}
