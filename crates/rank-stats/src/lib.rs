//! Rank quantization and view statistics for osmviews rasters.
//!
//! Given a tiled view-count raster this crate:
//! - detects tiles shared by many positions ([`SharedTiles`])
//! - maps every sample value to a log-rank interval ([`RankQuantizer`])
//! - builds a thinned rank/value curve with a median ([`StatsBuilder`])
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rank_stats::{BuildConfig, RankQuantizer, SharedTiles, StatsBuilder};
//! use tiff_parser::TiffReader;
//!
//! let config = BuildConfig::from_env();
//! let reader = Arc::new(TiffReader::open("osmviews.tiff")?);
//! let mut rng = config.rng();
//! let shared = Arc::new(SharedTiles::detect(reader.tile_offsets(), &mut rng));
//!
//! let buckets = RankQuantizer::new(reader.clone(), &config).build(shared.clone()).await?;
//! let stats = StatsBuilder::new(reader, shared).build(&mut rng)?;
//! ```

pub mod config;
pub mod error;
pub mod geo;
pub mod histogram;
pub mod quantizer;
pub mod shared_tiles;
pub mod stats;

pub use config::BuildConfig;
pub use error::{RankError, Result};
pub use geo::PixelProjection;
pub use histogram::{GeoSample, HistogramEntry, StatsBuilder, ValueHistogram};
pub use quantizer::{RankBucket, RankBuckets, RankQuantizer, RankRange};
pub use shared_tiles::{SharedTile, SharedTiles, RESERVOIR_SIZE};
pub use stats::{calc_stats, Stats, StatsSample};
