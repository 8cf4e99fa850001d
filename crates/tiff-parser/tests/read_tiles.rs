//! Integration tests: write synthetic rasters and read them back.

use std::sync::Arc;

use test_utils::{
    create_position_tile, ocean_fixture, require_test_file, zurich_fixture, TiffFixture,
};
use tiff_parser::{ByteOrder, TiffError, TiffReader};

#[test]
fn test_zurich_fixture_layout() {
    let reader = TiffReader::from_bytes(zurich_fixture().to_bytes()).unwrap();

    assert_eq!(reader.byte_order(), ByteOrder::LittleEndian);
    assert_eq!((reader.image_width(), reader.image_height()), (512, 512));
    assert_eq!((reader.tile_width(), reader.tile_height()), (256, 256));
    assert_eq!(reader.num_tiles(), 4);
    assert_eq!(reader.tile_offsets().len(), reader.tile_byte_counts().len());

    let max = reader.max_value();
    assert!((0.07098..=0.07099).contains(&max), "got max_value={}", max);

    let mut tile = reader.new_tile_buffer();
    for index in 0..reader.num_tiles() {
        reader.read_tile(index, &mut tile).unwrap();
        assert_eq!(tile.len(), 256 * 256);
    }
}

#[test]
fn test_zurich_fixture_from_file() {
    let fixture = zurich_fixture();
    let file = fixture.write_temp();
    let reader = TiffReader::open(file.path()).unwrap();

    let mut tile = reader.new_tile_buffer();
    reader.read_tile(1, &mut tile).unwrap();
    assert_eq!(tile, fixture.tile(1));
}

#[test]
fn test_big_endian_samples() {
    let fixture = TiffFixture::new(8, 8, 4, 4)
        .big_endian()
        .fill_tiles(|i| {
            create_position_tile(4, 4)
                .into_iter()
                .map(|v| v + i as f32 * 0.25)
                .collect()
        });
    let reader = TiffReader::from_bytes(fixture.to_bytes()).unwrap();
    assert_eq!(reader.byte_order(), ByteOrder::BigEndian);

    let mut tile = reader.new_tile_buffer();
    for index in 0..4 {
        reader.read_tile(index, &mut tile).unwrap();
        assert_eq!(tile, fixture.tile(index), "tile {}", index);
    }
}

#[test]
fn test_partial_edge_tiles() {
    // 10x6 image in 4x4 tiles: 3 columns, 2 rows of tiles.
    let reader = TiffReader::from_bytes(TiffFixture::new(10, 6, 4, 4).to_bytes()).unwrap();
    assert_eq!(reader.tiles_across(), 3);
    assert_eq!(reader.tiles_down(), 2);
    assert_eq!(reader.num_tiles(), 6);
    assert_eq!(reader.tile_origin(4), (4, 4));
}

#[test]
fn test_shared_offsets_survive_parsing() {
    let reader = TiffReader::from_bytes(ocean_fixture().to_bytes()).unwrap();
    let offsets = reader.tile_offsets();
    let ocean = offsets[0];

    let shared = offsets.iter().filter(|&&o| o == ocean).count();
    assert_eq!(shared, 64 - 4);
    for unique in [9, 18, 27, 36] {
        assert_ne!(offsets[unique], ocean);
    }

    let mut tile = reader.new_tile_buffer();
    reader.read_tile(63, &mut tile).unwrap();
    assert!(tile.iter().all(|v| *v == 0.5));
}

#[test]
fn test_corrupt_tile_fails_only_that_tile() {
    let reader =
        TiffReader::from_bytes(ocean_fixture().corrupt_tile(18).to_bytes()).unwrap();
    let mut tile = reader.new_tile_buffer();

    let err = reader.read_tile(18, &mut tile).unwrap_err();
    assert!(matches!(err, TiffError::Decompression { index: 18, .. }));

    reader.read_tile(9, &mut tile).unwrap();
}

#[test]
fn test_truncated_payload_is_io_error() {
    let full = bytes::Bytes::from(zurich_fixture().to_bytes());
    let reader = TiffReader::from_bytes(full.clone()).unwrap();
    let last = (0..reader.num_tiles())
        .max_by_key(|&i| reader.tile_offsets()[i])
        .unwrap();
    let offset = reader.tile_offsets()[last] as usize;
    let length = reader.tile_byte_counts()[last] as usize;

    // The directory stays readable; the tail of the last payload is gone.
    let truncated = TruncatedSource {
        full,
        missing: offset + 10..offset + length,
    };
    let reader = TiffReader::from_source(truncated).unwrap();
    let mut tile = reader.new_tile_buffer();
    let err = reader.read_tile(last, &mut tile).unwrap_err();
    assert!(matches!(err, TiffError::Io(_)), "got {:?}", err);
}

/// Source that fails any read touching the `missing` byte range.
struct TruncatedSource {
    full: bytes::Bytes,
    missing: std::ops::Range<usize>,
}

impl tiff_parser::RangeSource for TruncatedSource {
    fn read_range(&self, offset: u64, length: usize) -> tiff_parser::Result<bytes::Bytes> {
        let start = offset as usize;
        let end = start + length;
        if start < self.missing.end && end > self.missing.start {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated",
            )
            .into());
        }
        Ok(self.full.slice(start..end))
    }

    fn len(&self) -> u64 {
        self.full.len() as u64
    }

    fn identifier(&self) -> &str {
        "<truncated>"
    }
}

#[test]
fn test_concurrent_reads_match_sequential() {
    let fixture = zurich_fixture();
    let file = fixture.write_temp();
    let reader = Arc::new(TiffReader::open(file.path()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let reader = Arc::clone(&reader);
            std::thread::spawn(move || {
                let mut tile = reader.new_tile_buffer();
                let mut sums = Vec::new();
                for round in 0..4 {
                    let index = (worker + round) % reader.num_tiles();
                    reader.read_tile(index, &mut tile).unwrap();
                    sums.push((index, tile.iter().map(|v| *v as f64).sum::<f64>()));
                }
                sums
            })
        })
        .collect();

    let expected: Vec<f64> = (0..4)
        .map(|i| fixture.tile(i).iter().map(|v| *v as f64).sum())
        .collect();
    for handle in handles {
        for (index, sum) in handle.join().unwrap() {
            assert_eq!(sum, expected[index]);
        }
    }
}

#[test]
fn test_real_raster_if_available() {
    let path = require_test_file!("osmviews-sample.tiff");
    let reader = TiffReader::open(&path).unwrap();
    let mut tile = reader.new_tile_buffer();
    reader.read_tile(reader.num_tiles() - 1, &mut tile).unwrap();
    assert!(reader.max_value() > 0.0);
}
