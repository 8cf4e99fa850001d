//! Synthetic TIFF fixtures.
//!
//! [`TiffFixture`] writes tiled float32 rasters in the same layout as the
//! osmviews pipeline: one IFD, deflate-compressed tiles, identical tiles
//! stored once and referenced by several offsets, and an `SMaxSampleValue`
//! tag.

use std::collections::HashMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::generators::create_hotspot_tile;

/// Byte order used when writing a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureOrder {
    Little,
    Big,
}

/// Builder for an in-memory tiled raster.
#[derive(Debug, Clone)]
pub struct TiffFixture {
    order: FixtureOrder,
    image_width: u32,
    image_height: u32,
    tile_width: u32,
    tile_height: u32,
    tiles: Vec<Vec<f32>>,
    max_value: Option<f32>,
    corrupt: Vec<usize>,
    dedupe: bool,
}

impl TiffFixture {
    /// A raster whose tiles are all zero.
    pub fn new(image_width: u32, image_height: u32, tile_width: u32, tile_height: u32) -> Self {
        let across = image_width.div_ceil(tile_width) as usize;
        let down = image_height.div_ceil(tile_height) as usize;
        let tile_len = tile_width as usize * tile_height as usize;
        Self {
            order: FixtureOrder::Little,
            image_width,
            image_height,
            tile_width,
            tile_height,
            tiles: vec![vec![0.0; tile_len]; across * down],
            max_value: None,
            corrupt: Vec::new(),
            dedupe: true,
        }
    }

    pub fn big_endian(mut self) -> Self {
        self.order = FixtureOrder::Big;
        self
    }

    /// Replace the samples of one tile.
    pub fn with_tile(mut self, index: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), self.tile_len(), "tile {} has wrong size", index);
        self.tiles[index] = data;
        self
    }

    /// Fill every tile from a generator called with the tile index.
    pub fn fill_tiles(mut self, mut generate: impl FnMut(usize) -> Vec<f32>) -> Self {
        for index in 0..self.tiles.len() {
            let data = generate(index);
            assert_eq!(data.len(), self.tile_len(), "tile {} has wrong size", index);
            self.tiles[index] = data;
        }
        self
    }

    /// Declared maximum. Defaults to the largest sample written.
    pub fn with_max_value(mut self, max_value: f32) -> Self {
        self.max_value = Some(max_value);
        self
    }

    /// Write garbage instead of a deflate stream for this tile.
    pub fn corrupt_tile(mut self, index: usize) -> Self {
        self.corrupt.push(index);
        self
    }

    /// Store every tile separately, even when contents repeat.
    pub fn without_dedup(mut self) -> Self {
        self.dedupe = false;
        self
    }

    pub fn num_tiles(&self) -> usize {
        self.tiles.len()
    }

    pub fn tile_len(&self) -> usize {
        self.tile_width as usize * self.tile_height as usize
    }

    pub fn tile(&self, index: usize) -> &[f32] {
        &self.tiles[index]
    }

    /// Declared maximum sample value as it will be written.
    pub fn max_value(&self) -> f32 {
        self.max_value.unwrap_or_else(|| {
            self.tiles
                .iter()
                .flatten()
                .cloned()
                .fold(0.0f32, f32::max)
        })
    }

    /// Serialize to TIFF bytes.
    ///
    /// Layout: header, tile payloads, offset table, byte-count table, IFD.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(match self.order {
            FixtureOrder::Little => &[b'I', b'I', 42, 0],
            FixtureOrder::Big => &[b'M', b'M', 0, 42],
        });
        out.extend_from_slice(&[0; 4]); // IFD offset, patched below

        let mut offsets = Vec::with_capacity(self.tiles.len());
        let mut byte_counts = Vec::with_capacity(self.tiles.len());
        let mut stored: HashMap<Vec<u8>, u32> = HashMap::new();

        for (index, tile) in self.tiles.iter().enumerate() {
            let corrupt = self.corrupt.contains(&index);
            let payload = if corrupt {
                b"this is not a deflate stream".to_vec()
            } else {
                self.compress(tile)
            };

            let len = payload.len() as u32;
            let existing = if self.dedupe && !corrupt {
                stored.get(&payload).copied()
            } else {
                None
            };
            let offset = match existing {
                Some(offset) => offset,
                None => {
                    let offset = out.len() as u32;
                    out.extend_from_slice(&payload);
                    stored.insert(payload, offset);
                    offset
                }
            };
            offsets.push(offset);
            byte_counts.push(len);
        }

        let offsets_value = self.write_long_table(&mut out, &offsets);
        let counts_value = self.write_long_table(&mut out, &byte_counts);

        // Directories start on a word boundary.
        if out.len() % 2 == 1 {
            out.push(0);
        }
        let ifd_offset = out.len() as u32;
        let ifd_bytes = self.u32_bytes(ifd_offset);
        out[4..8].copy_from_slice(&ifd_bytes);

        let n = self.tiles.len() as u32;
        let entries: Vec<(u16, u16, u32, [u8; 4])> = vec![
            (256, 4, 1, self.u32_bytes(self.image_width)),
            (257, 4, 1, self.u32_bytes(self.image_height)),
            (258, 3, 1, self.u16_inline(32)),
            (259, 3, 1, self.u16_inline(8)),
            (277, 3, 1, self.u16_inline(1)),
            (322, 3, 1, self.u16_inline(self.tile_width as u16)),
            (323, 3, 1, self.u16_inline(self.tile_height as u16)),
            (324, 4, n, offsets_value),
            (325, 4, n, counts_value),
            (339, 3, 1, self.u16_inline(3)),
            (340, 11, 1, self.u32_bytes(self.max_value().to_bits())),
        ];

        out.extend_from_slice(&self.u16_bytes(entries.len() as u16));
        for (tag, field_type, count, value) in entries {
            out.extend_from_slice(&self.u16_bytes(tag));
            out.extend_from_slice(&self.u16_bytes(field_type));
            out.extend_from_slice(&self.u32_bytes(count));
            out.extend_from_slice(&value);
        }
        out.extend_from_slice(&[0; 4]); // no next IFD
        out
    }

    /// Write the fixture to a temporary file that is removed on drop.
    pub fn write_temp(&self) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("osmviews_fixture_")
            .suffix(".tiff")
            .tempfile()
            .expect("Failed to create fixture file");
        file.write_all(&self.to_bytes())
            .expect("Failed to write fixture file");
        file.flush().expect("Failed to flush fixture file");
        file
    }

    fn compress(&self, tile: &[f32]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        for sample in tile {
            let bytes = match self.order {
                FixtureOrder::Little => sample.to_le_bytes(),
                FixtureOrder::Big => sample.to_be_bytes(),
            };
            encoder.write_all(&bytes).expect("in-memory write");
        }
        encoder.finish().expect("in-memory write")
    }

    /// Returns the entry value field: inline for one value, otherwise the
    /// offset of a table appended to `out`.
    fn write_long_table(&self, out: &mut Vec<u8>, values: &[u32]) -> [u8; 4] {
        if values.len() == 1 {
            return self.u32_bytes(values[0]);
        }
        let offset = out.len() as u32;
        for value in values {
            out.extend_from_slice(&self.u32_bytes(*value));
        }
        self.u32_bytes(offset)
    }

    fn u16_bytes(&self, value: u16) -> [u8; 2] {
        match self.order {
            FixtureOrder::Little => value.to_le_bytes(),
            FixtureOrder::Big => value.to_be_bytes(),
        }
    }

    fn u32_bytes(&self, value: u32) -> [u8; 4] {
        match self.order {
            FixtureOrder::Little => value.to_le_bytes(),
            FixtureOrder::Big => value.to_be_bytes(),
        }
    }

    /// SHORT values are left-justified in the 4-byte value field.
    fn u16_inline(&self, value: u16) -> [u8; 4] {
        let b = self.u16_bytes(value);
        [b[0], b[1], 0, 0]
    }
}

/// 512x512 raster in 256x256 tiles with a small hotspot per tile and a
/// declared maximum of 0.070985, matching the Zurich extract the reader was
/// first checked against.
pub fn zurich_fixture() -> TiffFixture {
    TiffFixture::new(512, 512, 256, 256)
        .fill_tiles(|index| {
            let peak = 0.070985 - index as f32 * 0.01;
            create_hotspot_tile(256, 256, 128.0, 128.0, peak)
        })
        .with_max_value(0.070985)
}

/// An 8x8 grid of 4x4 tiles where most tiles are identical "ocean" and a few
/// carry distinct hotspots.
///
/// Tiles 9, 18, 27 and 36 are unique; every other tile shares one payload.
pub fn ocean_fixture() -> TiffFixture {
    TiffFixture::new(32, 32, 4, 4).fill_tiles(|index| match index {
        9 | 18 | 27 | 36 => create_hotspot_tile(4, 4, 1.0, 2.0, 100.0 * index as f32),
        _ => vec![0.5; 16],
    })
}
