//! TIFF header and Image File Directory (IFD) parsing.
//!
//! Only the baseline structures are handled: the 8-byte header and 12-byte
//! directory entries. Interpreting individual tags is left to the reader.

use crate::error::{Result, TiffError};

pub const TAG_IMAGE_WIDTH: u16 = 256;
pub const TAG_IMAGE_LENGTH: u16 = 257;
pub const TAG_BITS_PER_SAMPLE: u16 = 258;
pub const TAG_COMPRESSION: u16 = 259;
pub const TAG_SAMPLES_PER_PIXEL: u16 = 277;
pub const TAG_TILE_WIDTH: u16 = 322;
pub const TAG_TILE_LENGTH: u16 = 323;
pub const TAG_TILE_OFFSETS: u16 = 324;
pub const TAG_TILE_BYTE_COUNTS: u16 = 325;
pub const TAG_SAMPLE_FORMAT: u16 = 339;
pub const TAG_SMAX_SAMPLE_VALUE: u16 = 340;

pub const TYPE_SHORT: u16 = 3;
pub const TYPE_LONG: u16 = 4;
pub const TYPE_FLOAT: u16 = 11;
pub const TYPE_DOUBLE: u16 = 12;

/// Adobe-style deflate (zlib stream).
pub const COMPRESSION_DEFLATE: u32 = 8;
/// Pre-standard deflate code, same payload.
pub const COMPRESSION_DEFLATE_OLD: u32 = 32946;
/// IEEE floating point sample format.
pub const SAMPLE_FORMAT_FLOAT: u32 = 3;

/// Size of the TIFF header in bytes.
pub const HEADER_LEN: usize = 8;
/// Size of one directory entry in bytes.
pub const ENTRY_LEN: usize = 12;

/// Byte order declared by the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    pub fn read_u16(self, b: &[u8]) -> u16 {
        let bytes = [b[0], b[1]];
        match self {
            Self::LittleEndian => u16::from_le_bytes(bytes),
            Self::BigEndian => u16::from_be_bytes(bytes),
        }
    }

    pub fn read_u32(self, b: &[u8]) -> u32 {
        let bytes = [b[0], b[1], b[2], b[3]];
        match self {
            Self::LittleEndian => u32::from_le_bytes(bytes),
            Self::BigEndian => u32::from_be_bytes(bytes),
        }
    }

    pub fn read_f32(self, b: &[u8]) -> f32 {
        f32::from_bits(self.read_u32(b))
    }

    pub fn read_f64(self, b: &[u8]) -> f64 {
        let bytes = [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]];
        match self {
            Self::LittleEndian => f64::from_le_bytes(bytes),
            Self::BigEndian => f64::from_be_bytes(bytes),
        }
    }
}

/// Parsed 8-byte file header.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub byte_order: ByteOrder,
    pub first_ifd_offset: u32,
}

/// Parse the file header: byte-order marker, magic 42, first IFD offset.
pub fn parse_header(data: &[u8]) -> Result<Header> {
    if data.len() < HEADER_LEN {
        return Err(TiffError::invalid_format(format!(
            "header needs {} bytes, got {}",
            HEADER_LEN,
            data.len()
        )));
    }

    let byte_order = match &data[0..4] {
        [b'I', b'I', 42, 0] => ByteOrder::LittleEndian,
        [b'M', b'M', 0, 42] => ByteOrder::BigEndian,
        other => {
            return Err(TiffError::invalid_format(format!(
                "unsupported byte order marker {:02x?}",
                other
            )))
        }
    };

    Ok(Header {
        byte_order,
        first_ifd_offset: byte_order.read_u32(&data[4..8]),
    })
}

/// One 12-byte directory entry.
#[derive(Debug, Clone, PartialEq)]
pub struct IfdEntry {
    pub tag: u16,
    pub field_type: u16,
    pub count: u32,
    /// The value/offset field exactly as stored in the file.
    pub raw_value: [u8; 4],
}

impl IfdEntry {
    pub fn parse(bytes: &[u8], order: ByteOrder) -> Self {
        Self {
            tag: order.read_u16(&bytes[0..2]),
            field_type: order.read_u16(&bytes[2..4]),
            count: order.read_u32(&bytes[4..8]),
            raw_value: [bytes[8], bytes[9], bytes[10], bytes[11]],
        }
    }

    /// Byte size of a single value of this entry's type.
    pub fn type_size(&self) -> Option<usize> {
        match self.field_type {
            TYPE_SHORT => Some(2),
            TYPE_LONG | TYPE_FLOAT => Some(4),
            TYPE_DOUBLE => Some(8),
            _ => None,
        }
    }

    /// Total byte size of the entry's values.
    pub fn byte_len(&self) -> Option<usize> {
        self.type_size()
            .and_then(|size| size.checked_mul(self.count as usize))
    }

    /// Values of at most four bytes live in the entry itself.
    pub fn is_inline(&self) -> bool {
        matches!(self.byte_len(), Some(len) if len <= 4)
    }

    /// The value field read as an offset into the file.
    pub fn value_offset(&self, order: ByteOrder) -> u64 {
        order.read_u32(&self.raw_value) as u64
    }
}

/// Parse a directory block: a u16 entry count followed by the entries.
///
/// `data` must start at the directory offset. Trailing bytes (the next-IFD
/// pointer and beyond) are ignored.
pub fn parse_directory(data: &[u8], order: ByteOrder) -> Result<Vec<IfdEntry>> {
    if data.len() < 2 {
        return Err(TiffError::invalid_format("directory entry count is truncated"));
    }

    let num_entries = order.read_u16(&data[0..2]) as usize;
    let needed = 2 + num_entries * ENTRY_LEN;
    if data.len() < needed {
        return Err(TiffError::invalid_format(format!(
            "directory with {} entries needs {} bytes, got {}",
            num_entries,
            needed,
            data.len()
        )));
    }

    Ok(data[2..needed]
        .chunks_exact(ENTRY_LEN)
        .map(|chunk| IfdEntry::parse(chunk, order))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_little_endian() {
        let header = parse_header(&[b'I', b'I', 42, 0, 8, 0, 0, 0]).unwrap();
        assert_eq!(header.byte_order, ByteOrder::LittleEndian);
        assert_eq!(header.first_ifd_offset, 8);
    }

    #[test]
    fn test_parse_header_big_endian() {
        let header = parse_header(&[b'M', b'M', 0, 42, 0, 0, 1, 0]).unwrap();
        assert_eq!(header.byte_order, ByteOrder::BigEndian);
        assert_eq!(header.first_ifd_offset, 256);
    }

    #[test]
    fn test_parse_header_rejects_bad_magic() {
        // BigTIFF (43) and mixed markers are not produced by our pipeline
        for bytes in [
            [b'I', b'I', 43, 0, 8, 0, 0, 0],
            [b'I', b'M', 42, 0, 8, 0, 0, 0],
            [b'M', b'M', 42, 0, 0, 0, 0, 8],
            [0, 0, 0, 0, 0, 0, 0, 0],
        ] {
            let err = parse_header(&bytes).unwrap_err();
            assert!(err.is_format_error(), "{:?} should be rejected", bytes);
        }

        assert!(parse_header(b"II*").is_err());
    }

    #[test]
    fn test_parse_entry_both_orders() {
        let le = [0x42, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00];
        let entry = IfdEntry::parse(&le, ByteOrder::LittleEndian);
        assert_eq!(entry.tag, TAG_TILE_WIDTH);
        assert_eq!(entry.field_type, TYPE_SHORT);
        assert_eq!(entry.count, 1);
        assert_eq!(ByteOrder::LittleEndian.read_u16(&entry.raw_value), 256);

        let be = [0x01, 0x42, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00];
        let entry = IfdEntry::parse(&be, ByteOrder::BigEndian);
        assert_eq!(entry.tag, TAG_TILE_WIDTH);
        assert_eq!(entry.field_type, TYPE_SHORT);
        assert_eq!(ByteOrder::BigEndian.read_u16(&entry.raw_value), 256);
    }

    #[test]
    fn test_entry_inline_rules() {
        let mut entry = IfdEntry {
            tag: TAG_TILE_OFFSETS,
            field_type: TYPE_LONG,
            count: 1,
            raw_value: [0; 4],
        };
        assert!(entry.is_inline());

        entry.count = 4;
        assert!(!entry.is_inline());
        assert_eq!(entry.byte_len(), Some(16));

        entry.field_type = TYPE_SHORT;
        entry.count = 2;
        assert!(entry.is_inline());

        entry.field_type = TYPE_DOUBLE;
        entry.count = 1;
        assert!(!entry.is_inline());

        entry.field_type = 2; // ASCII
        assert_eq!(entry.byte_len(), None);
        assert!(!entry.is_inline());
    }

    #[test]
    fn test_parse_directory_truncated() {
        // Claims two entries but carries only one.
        let mut data = vec![2u8, 0];
        data.extend_from_slice(&[0u8; ENTRY_LEN]);
        let err = parse_directory(&data, ByteOrder::LittleEndian).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_float_decoding() {
        let value = 0.070985_f32;
        assert_eq!(ByteOrder::LittleEndian.read_f32(&value.to_le_bytes()), value);
        assert_eq!(ByteOrder::BigEndian.read_f32(&value.to_be_bytes()), value);
        assert_eq!(ByteOrder::BigEndian.read_f64(&1.5f64.to_be_bytes()), 1.5);
    }
}
