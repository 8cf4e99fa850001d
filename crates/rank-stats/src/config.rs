//! Configuration for rank and statistics builds.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{RankError, Result};

/// Default number of magnitude buckets for rank quantization.
pub const DEFAULT_NUM_BUCKETS: usize = 100_000;

/// Default capacity of the quantizer work queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Configuration for one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Number of magnitude buckets spanning `[0, max_value]`.
    pub num_buckets: usize,

    /// Quantizer worker count. 0 means one per available CPU.
    pub workers: usize,

    /// Bounded queue size between the task producer and the workers.
    pub queue_capacity: usize,

    /// Seed for traversal permutations and reservoir replacement.
    /// `None` seeds from the clock.
    pub seed: Option<u64>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            num_buckets: DEFAULT_NUM_BUCKETS,
            workers: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            seed: None,
        }
    }
}

impl BuildConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RANK_BUCKETS") {
            if let Ok(n) = val.parse() {
                config.num_buckets = n;
            }
        }

        if let Ok(val) = std::env::var("RANK_WORKERS") {
            if let Ok(n) = val.parse() {
                config.workers = n;
            }
        }

        if let Ok(val) = std::env::var("RANK_QUEUE_CAPACITY") {
            if let Ok(n) = val.parse() {
                config.queue_capacity = n;
            }
        }

        if let Ok(val) = std::env::var("RANDOM_SEED") {
            if let Ok(seed) = val.parse() {
                config.seed = Some(seed);
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.num_buckets < 2 {
            return Err(RankError::invalid_config("num_buckets must be >= 2"));
        }

        if self.queue_capacity == 0 {
            return Err(RankError::invalid_config("queue_capacity must be > 0"));
        }

        Ok(())
    }

    /// Worker count with 0 resolved to the available parallelism.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4)
    }

    /// Random source for one build, seeded from `seed` or the clock.
    pub fn rng(&self) -> StdRng {
        let seed = self.seed.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0)
        });
        StdRng::seed_from_u64(seed)
    }
}
