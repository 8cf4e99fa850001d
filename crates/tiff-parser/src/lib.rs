//! Reader for the tiled float32 TIFF rasters produced by the osmviews pipeline.
//!
//! Supports exactly what the pipeline writes: a single image directory in
//! either byte order, square-ish tiles of IEEE float32 samples, each tile
//! compressed as a zlib/deflate stream, and an `SMaxSampleValue` tag holding
//! the largest sample in the image.
//!
//! # Example
//!
//! ```ignore
//! use tiff_parser::TiffReader;
//!
//! let reader = TiffReader::open("osmviews.tiff")?;
//! let mut tile = reader.new_tile_buffer();
//! for index in 0..reader.num_tiles() {
//!     reader.read_tile(index, &mut tile)?;
//! }
//! ```

pub mod error;
pub mod ifd;
pub mod reader;
pub mod source;

pub use error::{Result, TiffError};
pub use ifd::ByteOrder;
pub use reader::{RasterInfo, TiffReader};
pub use source::{FileSource, MemorySource, RangeSource};
