//! Error types for TIFF parsing and tile decoding.

use thiserror::Error;

/// Errors that can occur while reading a tiled raster.
#[derive(Error, Debug)]
pub enum TiffError {
    /// Header or directory bytes do not form a TIFF we can read.
    #[error("invalid TIFF format: {0}")]
    InvalidFormat(String),

    /// A tag required to locate or decode tiles is absent.
    #[error("missing required tag {name} ({tag})")]
    MissingTag { tag: u16, name: &'static str },

    /// A tag carries a field type we do not accept for it.
    #[error("tag {tag} has field type {actual}, expected {expected}")]
    UnexpectedType {
        tag: u16,
        actual: u16,
        expected: &'static str,
    },

    /// A tag value outside the subset written by the osmviews pipeline.
    #[error("unsupported {what}: {value}")]
    Unsupported { what: &'static str, value: u32 },

    /// Tile position beyond the tile table.
    #[error("tile {index} out of range (raster has {count} tiles)")]
    TileOutOfRange { index: usize, count: usize },

    /// Output buffer does not match the tile size.
    #[error("tile buffer holds {actual} samples, tile has {expected}")]
    BufferSize { expected: usize, actual: usize },

    /// The compressed tile payload could not be inflated.
    #[error("failed to decompress tile {index}: {reason}")]
    Decompression { index: usize, reason: String },

    /// Read failure, including truncated byte ranges.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TiffError {
    /// Create an InvalidFormat error.
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// True for structural problems with the file (as opposed to read or
    /// decompression failures on otherwise well-formed input).
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat(_)
                | Self::MissingTag { .. }
                | Self::UnexpectedType { .. }
                | Self::Unsupported { .. }
        )
    }
}

/// Result type for TIFF operations.
pub type Result<T> = std::result::Result<T, TiffError>;
