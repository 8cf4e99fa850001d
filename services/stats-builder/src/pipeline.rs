//! One batch build: shared tiles, rank buckets, statistics.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use rank_stats::{BuildConfig, RankBuckets, RankQuantizer, SharedTiles, Stats, StatsBuilder};
use tiff_parser::TiffReader;
use tracing::info;

/// Everything one build produces.
pub struct BuildOutputs {
    pub buckets: RankBuckets,
    pub stats: Stats,
}

/// Run both builds over the raster at `input`.
///
/// `config.seed` must be set; it drives both the shared tile reservoirs and
/// the histogram traversal.
pub async fn run_build(input: &Path, config: &BuildConfig) -> Result<BuildOutputs> {
    let start = Instant::now();
    config.validate()?;

    let reader = Arc::new(
        TiffReader::open(input).with_context(|| format!("Failed to open {}", input.display()))?,
    );
    info!(
        input = %input.display(),
        width = reader.image_width(),
        height = reader.image_height(),
        tiles = reader.num_tiles(),
        max_value = reader.max_value(),
        "Opened raster"
    );

    let mut rng = config.rng();
    let shared = Arc::new(SharedTiles::detect(reader.tile_offsets(), &mut rng));
    let covered = shared.coverage();
    info!(
        groups = shared.len(),
        covered_tiles = covered,
        shared_ratio = covered as f64 / reader.num_tiles().max(1) as f64,
        "Shared tiles detected"
    );

    let buckets = RankQuantizer::new(Arc::clone(&reader), config)
        .build(Arc::clone(&shared))
        .await?;

    let builder = StatsBuilder::new(reader, shared);
    let stats = tokio::task::spawn_blocking(move || builder.build(&mut rng))
        .await
        .context("Statistics task failed")??;

    info!(
        samples = stats.samples.len(),
        median = stats.median,
        total_count = stats.total_count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Build complete"
    );

    Ok(BuildOutputs { buckets, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::ocean_fixture;

    #[tokio::test]
    async fn test_run_build_on_fixture() {
        let file = ocean_fixture().write_temp();
        let config = BuildConfig {
            num_buckets: 500,
            workers: 2,
            seed: Some(12),
            ..Default::default()
        };

        let outputs = run_build(file.path(), &config).await.unwrap();
        assert_eq!(outputs.buckets.total_count(), 64 * 16);
        assert_eq!(outputs.stats.total_count(), 64 * 16);
    }

    #[tokio::test]
    async fn test_missing_input_fails() {
        let config = BuildConfig {
            seed: Some(1),
            ..Default::default()
        };
        let result = run_build(Path::new("/nonexistent/osmviews.tiff"), &config).await;
        assert!(result.is_err());
    }
}
