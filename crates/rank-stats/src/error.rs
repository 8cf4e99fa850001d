//! Error types for rank and statistics builds.

use thiserror::Error;
use tiff_parser::TiffError;

/// Errors that can occur while building ranks or statistics.
///
/// Every error is fatal to the build; there is no partial output.
#[derive(Error, Debug)]
pub enum RankError {
    /// Reading or decoding the raster failed.
    #[error("raster error: {0}")]
    Tiff(#[from] TiffError),

    /// The raster has no tile positions or carries no weight at all.
    #[error("raster is empty: {0}")]
    EmptyRaster(String),

    /// A worker task panicked or was aborted.
    #[error("worker failed: {0}")]
    WorkerFailed(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    InvalidConfig(String),
}

impl RankError {
    /// Create an EmptyRaster error.
    pub fn empty_raster(msg: impl Into<String>) -> Self {
        Self::EmptyRaster(msg.into())
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Result type for rank and statistics operations.
pub type Result<T> = std::result::Result<T, RankError>;
