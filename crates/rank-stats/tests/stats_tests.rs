//! Statistics builds over synthetic rasters.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rank_stats::{RankError, SharedTiles, Stats, StatsBuilder};
use test_utils::{create_hotspot_tile, ocean_fixture, zurich_fixture, TiffFixture};
use tiff_parser::TiffReader;

fn builder(fixture: &TiffFixture, seed: u64) -> StatsBuilder {
    let reader = Arc::new(TiffReader::from_bytes(fixture.to_bytes()).unwrap());
    let mut rng = StdRng::seed_from_u64(seed);
    let shared = Arc::new(SharedTiles::detect(reader.tile_offsets(), &mut rng));
    StatsBuilder::new(reader, shared)
}

fn build(fixture: &TiffFixture, seed: u64) -> Stats {
    builder(fixture, seed)
        .build(&mut StdRng::seed_from_u64(seed))
        .unwrap()
}

/// Hotspots spread over the whole raster so the histogram has many keys.
fn city_fixture() -> TiffFixture {
    TiffFixture::new(64, 64, 16, 16).fill_tiles(|i| {
        let cx = (i % 4) as f32 * 3.0 + 2.0;
        let cy = (i / 4) as f32 * 3.0 + 1.0;
        create_hotspot_tile(16, 16, cx, cy, 5000.0 + i as f32 * 700.0)
    })
}

#[test]
fn test_samples_sorted_by_rank() {
    let stats = build(&city_fixture(), 1);

    assert!(stats.samples.len() > 1);
    assert!(stats.samples.windows(2).all(|w| w[0].rank <= w[1].rank));
    assert!(stats.samples.windows(2).all(|w| w[0].value >= w[1].value));
}

#[test]
fn test_last_rank_is_total_count() {
    let fixture = city_fixture();
    let stats = build(&fixture, 2);

    let total = fixture.num_tiles() as u64 * fixture.tile_len() as u64;
    assert_eq!(stats.samples.last().unwrap().rank, total);
    assert_eq!(stats.total_count(), total);
}

#[test]
fn test_median_is_first_sample_past_half() {
    let stats = build(&city_fixture(), 3);
    let half = stats.total_count() / 2;

    let expected = stats
        .samples
        .iter()
        .position(|s| s.rank >= half)
        .unwrap();
    assert_eq!(stats.median, expected);
}

#[test]
fn test_curve_is_thinned() {
    let builder = builder(&city_fixture(), 4);
    let entries = builder
        .build_histogram(&mut StdRng::seed_from_u64(4))
        .unwrap()
        .into_sorted_entries();
    let stats = rank_stats::calc_stats(&entries).unwrap();

    assert!(entries.len() > 100);
    assert!(stats.samples.len() < entries.len());
}

#[test]
fn test_same_seed_same_stats() {
    let fixture = city_fixture();
    assert_eq!(build(&fixture, 9), build(&fixture, 9));
}

#[test]
fn test_shared_groups_contribute_their_mass() {
    let fixture = ocean_fixture();
    let builder = builder(&fixture, 5);
    let histogram = builder
        .build_histogram(&mut StdRng::seed_from_u64(5))
        .unwrap();

    assert_eq!(histogram.total_count(), 64 * 16);

    let entries = histogram.into_sorted_entries();
    let ocean: Vec<_> = entries
        .iter()
        .filter(|e| e.sample.value == 0.5)
        .collect();
    // One entry per reservoir position of the 60-tile ocean group.
    assert_eq!(ocean.len(), 60);
    assert_eq!(ocean.iter().map(|e| e.count).sum::<u64>(), 60 * 16);
}

#[test]
fn test_geo_samples_are_on_the_map() {
    let entries = builder(&zurich_fixture(), 6)
        .build_histogram(&mut StdRng::seed_from_u64(6))
        .unwrap()
        .into_sorted_entries();

    for entry in &entries {
        assert!((-180.0..180.0).contains(&entry.sample.longitude));
        assert!(entry.sample.latitude.abs() < 85.06);
    }
}

#[test]
fn test_empty_raster_is_rejected() {
    let err = builder(&TiffFixture::new(0, 4, 4, 4), 7)
        .build(&mut StdRng::seed_from_u64(7))
        .unwrap_err();
    assert!(matches!(err, RankError::EmptyRaster(_)));
}

#[test]
fn test_json_layout() {
    let stats = build(&ocean_fixture(), 8);
    let json: serde_json::Value = serde_json::to_value(&stats).unwrap();

    assert_eq!(json["Median"], serde_json::json!(stats.median));
    let samples = json["Samples"].as_array().unwrap();
    assert_eq!(samples.len(), stats.samples.len());

    let first = samples[0].as_array().unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first[0].as_array().unwrap().len(), 2);
    assert_eq!(first[1].as_u64().unwrap(), stats.samples[0].rank);
}
