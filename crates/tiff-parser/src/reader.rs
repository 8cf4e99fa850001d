//! Tiled raster reader.
//!
//! Reads the first IFD of a TIFF written by the osmviews pipeline and decodes
//! individual tiles on demand. It is not a general reader for arbitrary image
//! files from other programs.

use std::io::Read;
use std::path::Path;

use bytes::Bytes;
use flate2::read::ZlibDecoder;
use tracing::debug;

use crate::error::{Result, TiffError};
use crate::ifd::*;
use crate::source::{FileSource, MemorySource, RangeSource};

/// Layout of an opened raster. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct RasterInfo {
    pub byte_order: ByteOrder,
    pub image_width: u32,
    pub image_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Compressed-data offset per tile position.
    pub tile_offsets: Vec<u32>,
    /// Compressed-data length per tile position.
    pub tile_byte_counts: Vec<u32>,
    /// Declared maximum sample value (SMaxSampleValue).
    pub max_value: f32,
}

impl RasterInfo {
    /// Number of tile columns.
    pub fn tiles_across(&self) -> u32 {
        self.image_width.div_ceil(self.tile_width)
    }

    /// Number of tile rows.
    pub fn tiles_down(&self) -> u32 {
        self.image_height.div_ceil(self.tile_height)
    }

    /// Samples per decoded tile.
    pub fn tile_len(&self) -> usize {
        self.tile_width as usize * self.tile_height as usize
    }

    pub fn num_tiles(&self) -> usize {
        self.tile_offsets.len()
    }
}

/// Random-access reader for tiled float32 rasters.
///
/// Safe to share between threads: every tile read addresses an absolute byte
/// range of the underlying source.
pub struct TiffReader {
    source: Box<dyn RangeSource>,
    info: RasterInfo,
}

impl TiffReader {
    /// Open a raster file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_source(FileSource::open(path)?)
    }

    /// Read a raster held in memory.
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self> {
        Self::from_source(MemorySource::new(data))
    }

    /// Read a raster from any range source.
    pub fn from_source(source: impl RangeSource + 'static) -> Result<Self> {
        let info = read_first_ifd(&source)?;
        debug!(
            source = source.identifier(),
            width = info.image_width,
            height = info.image_height,
            tile_width = info.tile_width,
            tile_height = info.tile_height,
            tiles = info.num_tiles(),
            max_value = info.max_value,
            "Opened tiled raster"
        );
        Ok(Self {
            source: Box::new(source),
            info,
        })
    }

    pub fn info(&self) -> &RasterInfo {
        &self.info
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.info.byte_order
    }

    pub fn image_width(&self) -> u32 {
        self.info.image_width
    }

    pub fn image_height(&self) -> u32 {
        self.info.image_height
    }

    pub fn tile_width(&self) -> u32 {
        self.info.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.info.tile_height
    }

    pub fn max_value(&self) -> f32 {
        self.info.max_value
    }

    pub fn tile_offsets(&self) -> &[u32] {
        &self.info.tile_offsets
    }

    pub fn tile_byte_counts(&self) -> &[u32] {
        &self.info.tile_byte_counts
    }

    pub fn num_tiles(&self) -> usize {
        self.info.num_tiles()
    }

    pub fn tiles_across(&self) -> u32 {
        self.info.tiles_across()
    }

    pub fn tiles_down(&self) -> u32 {
        self.info.tiles_down()
    }

    pub fn tile_len(&self) -> usize {
        self.info.tile_len()
    }

    /// A zeroed buffer sized for `read_tile`.
    pub fn new_tile_buffer(&self) -> Vec<f32> {
        vec![0.0; self.tile_len()]
    }

    /// Pixel coordinates of the top-left corner of a tile.
    pub fn tile_origin(&self, index: usize) -> (u32, u32) {
        let across = self.tiles_across() as usize;
        let col = (index % across) as u32;
        let row = (index / across) as u32;
        (col * self.info.tile_width, row * self.info.tile_height)
    }

    /// Decode one tile into `out`, which must hold exactly `tile_len()` samples.
    pub fn read_tile(&self, index: usize, out: &mut [f32]) -> Result<()> {
        let count = self.num_tiles();
        if index >= count {
            return Err(TiffError::TileOutOfRange { index, count });
        }

        let expected = self.tile_len();
        if out.len() != expected {
            return Err(TiffError::BufferSize {
                expected,
                actual: out.len(),
            });
        }

        let offset = self.info.tile_offsets[index] as u64;
        let length = self.info.tile_byte_counts[index] as usize;
        let compressed = self.source.read_range(offset, length)?;

        let mut raw = vec![0u8; expected * 4];
        ZlibDecoder::new(&compressed[..])
            .read_exact(&mut raw)
            .map_err(|e| TiffError::Decompression {
                index,
                reason: e.to_string(),
            })?;

        decode_samples(&raw, self.info.byte_order, out);
        Ok(())
    }
}

/// Decode packed float32 samples in the given byte order.
pub fn decode_samples(raw: &[u8], order: ByteOrder, out: &mut [f32]) {
    for (sample, bytes) in out.iter_mut().zip(raw.chunks_exact(4)) {
        *sample = order.read_f32(bytes);
    }
}

fn read_first_ifd(source: &dyn RangeSource) -> Result<RasterInfo> {
    if source.len() < HEADER_LEN as u64 {
        return Err(TiffError::invalid_format(format!(
            "file has {} bytes, shorter than a TIFF header",
            source.len()
        )));
    }

    let header = parse_header(&source.read_range(0, HEADER_LEN)?)?;
    let order = header.byte_order;
    let ifd_offset = header.first_ifd_offset as u64;

    let count_bytes = source.read_range(ifd_offset, 2)?;
    let num_entries = order.read_u16(&count_bytes) as usize;
    let directory = source.read_range(ifd_offset, 2 + num_entries * ENTRY_LEN)?;
    let entries = parse_directory(&directory, order)?;

    let mut image_width = None;
    let mut image_height = None;
    let mut tile_width = None;
    let mut tile_height = None;
    let mut tile_offsets = None;
    let mut tile_byte_counts = None;
    let mut max_value = None;

    for entry in &entries {
        match entry.tag {
            TAG_IMAGE_WIDTH => image_width = Some(scalar_u32(entry, order)?),
            TAG_IMAGE_LENGTH => image_height = Some(scalar_u32(entry, order)?),
            TAG_TILE_WIDTH => tile_width = Some(scalar_u32(entry, order)?),
            TAG_TILE_LENGTH => tile_height = Some(scalar_u32(entry, order)?),
            TAG_TILE_OFFSETS => tile_offsets = Some(long_array(source, entry, order)?),
            TAG_TILE_BYTE_COUNTS => tile_byte_counts = Some(long_array(source, entry, order)?),
            TAG_SMAX_SAMPLE_VALUE => max_value = Some(float_value(source, entry, order)?),
            TAG_COMPRESSION => {
                let value = scalar_u32(entry, order)?;
                if value != COMPRESSION_DEFLATE && value != COMPRESSION_DEFLATE_OLD {
                    return Err(TiffError::Unsupported {
                        what: "compression",
                        value,
                    });
                }
            }
            TAG_BITS_PER_SAMPLE => {
                let value = scalar_u32(entry, order)?;
                if value != 32 {
                    return Err(TiffError::Unsupported {
                        what: "bits per sample",
                        value,
                    });
                }
            }
            TAG_SAMPLES_PER_PIXEL => {
                let value = scalar_u32(entry, order)?;
                if value != 1 {
                    return Err(TiffError::Unsupported {
                        what: "samples per pixel",
                        value,
                    });
                }
            }
            TAG_SAMPLE_FORMAT => {
                let value = scalar_u32(entry, order)?;
                if value != SAMPLE_FORMAT_FLOAT {
                    return Err(TiffError::Unsupported {
                        what: "sample format",
                        value,
                    });
                }
            }
            _ => {}
        }
    }

    let info = RasterInfo {
        byte_order: order,
        image_width: require(image_width, TAG_IMAGE_WIDTH, "ImageWidth")?,
        image_height: require(image_height, TAG_IMAGE_LENGTH, "ImageLength")?,
        tile_width: require(tile_width, TAG_TILE_WIDTH, "TileWidth")?,
        tile_height: require(tile_height, TAG_TILE_LENGTH, "TileLength")?,
        tile_offsets: require(tile_offsets, TAG_TILE_OFFSETS, "TileOffsets")?,
        tile_byte_counts: require(tile_byte_counts, TAG_TILE_BYTE_COUNTS, "TileByteCounts")?,
        max_value: require(max_value, TAG_SMAX_SAMPLE_VALUE, "SMaxSampleValue")?,
    };

    if info.tile_width == 0 || info.tile_height == 0 {
        return Err(TiffError::invalid_format(format!(
            "tile size {}x{} is empty",
            info.tile_width, info.tile_height
        )));
    }

    let expected = info.tiles_across() as usize * info.tiles_down() as usize;
    if info.tile_offsets.len() != expected || info.tile_byte_counts.len() != expected {
        return Err(TiffError::invalid_format(format!(
            "expected {} tiles, got {} offsets and {} byte counts",
            expected,
            info.tile_offsets.len(),
            info.tile_byte_counts.len()
        )));
    }

    Ok(info)
}

fn require<T>(value: Option<T>, tag: u16, name: &'static str) -> Result<T> {
    value.ok_or(TiffError::MissingTag { tag, name })
}

/// A single SHORT or LONG value stored inline.
fn scalar_u32(entry: &IfdEntry, order: ByteOrder) -> Result<u32> {
    match entry.field_type {
        TYPE_SHORT => Ok(order.read_u16(&entry.raw_value) as u32),
        TYPE_LONG => Ok(order.read_u32(&entry.raw_value)),
        actual => Err(TiffError::UnexpectedType {
            tag: entry.tag,
            actual,
            expected: "SHORT or LONG",
        }),
    }
}

/// An array of LONG values, inline or out-of-line.
fn long_array(source: &dyn RangeSource, entry: &IfdEntry, order: ByteOrder) -> Result<Vec<u32>> {
    if entry.field_type != TYPE_LONG {
        return Err(TiffError::UnexpectedType {
            tag: entry.tag,
            actual: entry.field_type,
            expected: "LONG",
        });
    }

    let bytes = entry_bytes(source, entry, order)?;
    Ok(bytes.chunks_exact(4).map(|chunk| order.read_u32(chunk)).collect())
}

/// The first value of a FLOAT or DOUBLE entry.
fn float_value(source: &dyn RangeSource, entry: &IfdEntry, order: ByteOrder) -> Result<f32> {
    if entry.count == 0 {
        return Err(TiffError::invalid_format(format!(
            "tag {} has no values",
            entry.tag
        )));
    }

    match entry.field_type {
        TYPE_FLOAT => Ok(order.read_f32(&entry_bytes(source, entry, order)?)),
        TYPE_DOUBLE => Ok(order.read_f64(&entry_bytes(source, entry, order)?) as f32),
        actual => Err(TiffError::UnexpectedType {
            tag: entry.tag,
            actual,
            expected: "FLOAT or DOUBLE",
        }),
    }
}

fn entry_bytes(source: &dyn RangeSource, entry: &IfdEntry, order: ByteOrder) -> Result<Bytes> {
    let len = entry.byte_len().ok_or(TiffError::UnexpectedType {
        tag: entry.tag,
        actual: entry.field_type,
        expected: "SHORT, LONG, FLOAT or DOUBLE",
    })?;

    if entry.is_inline() {
        Ok(Bytes::copy_from_slice(&entry.raw_value[..len]))
    } else {
        source.read_range(entry.value_offset(order), len)
    }
}
