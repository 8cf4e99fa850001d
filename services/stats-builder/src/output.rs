//! JSON artifacts written by the driver.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rank_stats::{RankBuckets, RankRange};
use serde::Serialize;

/// Rank ranges handed to the raster writer.
#[derive(Debug, Clone, Serialize)]
pub struct RanksArtifact {
    pub generated_at: DateTime<Utc>,
    pub source: String,
    pub seed: u64,
    pub num_buckets: usize,
    pub total_count: u64,
    pub ranges: Vec<RankRange>,
}

impl RanksArtifact {
    pub fn new(source: &Path, seed: u64, buckets: &RankBuckets) -> Self {
        Self {
            generated_at: Utc::now(),
            source: source.display().to_string(),
            seed,
            num_buckets: buckets.len(),
            total_count: buckets.total_count(),
            ranges: buckets.ranges(),
        }
    }
}

/// Serialize `value` to `path` without ever leaving a partial file behind.
///
/// The JSON goes to `<path>.tmp` first, is synced, then renamed over `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec(value).context("Failed to serialize JSON")?;

    let tmp_path = tmp_path(path);
    let mut file = File::create(&tmp_path)
        .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
    file.write_all(&json)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync {}", tmp_path.display()))?;
    drop(file);

    fs::rename(&tmp_path, path).with_context(|| {
        format!("Failed to rename {} to {}", tmp_path.display(), path.display())
    })?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
