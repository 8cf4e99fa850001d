//! Concurrent log-rank quantization.
//!
//! Every raster sample is assigned to one of `num_buckets` magnitude bins,
//! bucket 0 holding the highest values. After all tiles are counted, the
//! buckets are walked in order and each receives the range of ranks its
//! samples occupy. A pixel quantized to `n` then stands for a location whose
//! view rank lies in `[e^n, e^(n+1) - 1]`.
//!
//! One producer task feeds a bounded channel; blocking workers decode tiles
//! and add them to the shared bucket array under a single lock. The first
//! failure cancels every participant.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tiff_parser::TiffReader;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BuildConfig;
use crate::error::{RankError, Result};
use crate::shared_tiles::SharedTiles;

/// One magnitude bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankBucket {
    /// Weighted number of samples in this bin.
    pub count: u64,
    /// Smallest sample seen. `+inf` while empty.
    pub min_value: f32,
    /// Largest sample seen. `-inf` while empty.
    pub max_value: f32,
    /// `ln` of the first rank in this bin.
    pub log_min_rank: f64,
    /// `ln` of one past the last rank in this bin.
    pub log_max_rank: f64,
}

impl Default for RankBucket {
    fn default() -> Self {
        Self {
            count: 0,
            min_value: f32::INFINITY,
            max_value: f32::NEG_INFINITY,
            log_min_rank: 0.0,
            log_max_rank: 0.0,
        }
    }
}

impl RankBucket {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn add(&mut self, value: f32, weight: u64) {
        self.count += weight;
        self.min_value = self.min_value.min(value);
        self.max_value = self.max_value.max(value);
    }
}

/// A non-empty bucket as handed to the raster writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankRange {
    pub bucket: usize,
    pub min_value: f32,
    pub max_value: f32,
    pub count: u64,
    pub log_min_rank: f64,
    pub log_max_rank: f64,
}

/// Finalized buckets with their rank ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct RankBuckets {
    buckets: Vec<RankBucket>,
    scale: f64,
}

impl RankBuckets {
    /// Assign rank ranges to counted buckets, starting at rank 1.
    fn finalize(mut buckets: Vec<RankBucket>, scale: f64) -> Self {
        let mut rank: u64 = 1;
        for bucket in &mut buckets {
            bucket.log_min_rank = (rank as f64).ln();
            bucket.log_max_rank = ((rank + bucket.count) as f64).ln();
            rank += bucket.count;
        }
        Self { buckets, scale }
    }

    pub fn buckets(&self) -> &[RankBucket] {
        &self.buckets
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Bucket holding `value`.
    pub fn bucket_index(&self, value: f32) -> usize {
        bucket_index(self.buckets.len(), self.scale, value)
    }

    /// `(ln(first rank), ln(last rank + 1))` of the bucket holding `value`.
    pub fn log_rank_range(&self, value: f32) -> (f64, f64) {
        let bucket = &self.buckets[self.bucket_index(value)];
        (bucket.log_min_rank, bucket.log_max_rank)
    }

    /// Quantized log rank of `value`. The most viewed location maps to 0.
    pub fn quantize(&self, value: f32) -> u16 {
        self.log_rank_range(value).0.floor() as u16
    }

    /// Sum of all bucket counts.
    pub fn total_count(&self) -> u64 {
        self.buckets.iter().map(|b| b.count).sum()
    }

    /// Non-empty buckets in rank order.
    pub fn ranges(&self) -> Vec<RankRange> {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.is_empty())
            .map(|(bucket, b)| RankRange {
                bucket,
                min_value: b.min_value,
                max_value: b.max_value,
                count: b.count,
                log_min_rank: b.log_min_rank,
                log_max_rank: b.log_max_rank,
            })
            .collect()
    }
}

/// `clamp(B - 1 - floor(value * scale), 0, B - 1)`.
fn bucket_index(num_buckets: usize, scale: f64, value: f32) -> usize {
    let last = num_buckets as i64 - 1;
    let index = last - (value as f64 * scale).floor() as i64;
    index.clamp(0, last) as usize
}

/// Per-bucket scale for a raster maximum. 0 when there is no positive maximum.
fn bucket_scale(num_buckets: usize, max_value: f32) -> f64 {
    if max_value > 0.0 {
        (num_buckets - 1) as f64 / max_value as f64
    } else {
        0.0
    }
}

/// A tile to decode and the number of positions it stands for.
#[derive(Debug, Clone, Copy)]
struct TileTask {
    position: usize,
    weight: u64,
}

struct Accumulator {
    buckets: Vec<RankBucket>,
    scale: f64,
}

impl Accumulator {
    fn add_tile(&mut self, samples: &[f32], weight: u64) {
        let n = self.buckets.len();
        for &value in samples {
            self.buckets[bucket_index(n, self.scale, value)].add(value, weight);
        }
    }
}

/// Builds [`RankBuckets`] for one raster.
pub struct RankQuantizer {
    reader: Arc<TiffReader>,
    config: BuildConfig,
}

impl RankQuantizer {
    pub fn new(reader: Arc<TiffReader>, config: &BuildConfig) -> Self {
        Self {
            reader,
            config: config.clone(),
        }
    }

    /// Count every tile position and assign rank ranges.
    ///
    /// Shared groups are decoded once and weighted by their use count.
    pub async fn build(&self, shared: Arc<SharedTiles>) -> Result<RankBuckets> {
        self.config.validate()?;
        if self.reader.num_tiles() == 0 {
            return Err(RankError::empty_raster("no tile positions"));
        }

        let start = Instant::now();
        let num_buckets = self.config.num_buckets;
        let scale = bucket_scale(num_buckets, self.reader.max_value());
        let workers = self.config.effective_workers();

        let accumulator = Arc::new(Mutex::new(Accumulator {
            buckets: vec![RankBucket::default(); num_buckets],
            scale,
        }));
        let (tx, rx) = mpsc::channel::<TileTask>(self.config.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();

        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        {
            let reader = Arc::clone(&self.reader);
            let shared = Arc::clone(&shared);
            let cancel = cancel.clone();
            tasks.spawn(async move { produce(reader, shared, tx, cancel).await });
        }

        for worker_id in 0..workers {
            let reader = Arc::clone(&self.reader);
            let rx = Arc::clone(&rx);
            let accumulator = Arc::clone(&accumulator);
            let cancel = cancel.clone();
            tasks.spawn_blocking(move || run_worker(worker_id, reader, rx, accumulator, cancel));
        }

        debug!(
            workers = workers,
            num_buckets = num_buckets,
            shared_groups = shared.len(),
            "Rank quantizer started"
        );

        let mut first_error: Option<RankError> = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| Err(RankError::WorkerFailed(e.to_string())));
            if let Err(e) = outcome {
                cancel.cancel();
                if first_error.is_none() {
                    warn!(error = %e, "Rank quantization cancelled");
                    first_error = Some(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let buckets = std::mem::take(&mut accumulator.lock().buckets);
        let result = RankBuckets::finalize(buckets, scale);

        info!(
            total_count = result.total_count(),
            non_empty_buckets = result.buckets.iter().filter(|b| !b.is_empty()).count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Rank quantization complete"
        );

        Ok(result)
    }
}

/// Enqueue one task per shared group, then one per unique position.
///
/// Stops quietly when cancelled; the error that caused it is reported by
/// whoever failed.
async fn produce(
    reader: Arc<TiffReader>,
    shared: Arc<SharedTiles>,
    tx: mpsc::Sender<TileTask>,
    cancel: CancellationToken,
) -> Result<()> {
    let groups = shared.iter().map(|(_, group)| TileTask {
        position: group.first_sample(),
        weight: group.use_count as u64,
    });
    let unique = shared
        .unique_positions(reader.tile_offsets())
        .map(|position| TileTask {
            position,
            weight: 1,
        });

    let mut queued = 0usize;
    for task in groups.chain(unique) {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(queued = queued, "Producer stopped by cancellation");
                return Ok(());
            }
            sent = tx.send(task) => {
                if sent.is_err() {
                    // Every worker is gone.
                    return Ok(());
                }
            }
        }
        queued += 1;
    }

    debug!(queued = queued, "Producer finished");
    Ok(())
}

fn run_worker(
    worker_id: usize,
    reader: Arc<TiffReader>,
    rx: Arc<Mutex<mpsc::Receiver<TileTask>>>,
    accumulator: Arc<Mutex<Accumulator>>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut tile = reader.new_tile_buffer();
    let mut processed = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let task = rx.lock().blocking_recv();
        let Some(task) = task else {
            break;
        };

        if let Err(e) = reader.read_tile(task.position, &mut tile) {
            cancel.cancel();
            return Err(e.into());
        }

        accumulator.lock().add_tile(&tile, task.weight);
        processed += 1;
    }

    debug!(worker_id = worker_id, processed = processed, "Worker finished");
    Ok(())
}
