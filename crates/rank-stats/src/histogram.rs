//! Value histogram with geographic samples.
//!
//! Samples are keyed by their rounded value. Each key keeps an aggregate
//! count and one representative location, which is enough to draw the
//! rank/value curve and to show where a given view count occurs.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rand::seq::SliceRandom;
use rand::Rng;
use tiff_parser::TiffReader;
use tracing::{debug, info};

use crate::error::Result;
use crate::geo::PixelProjection;
use crate::shared_tiles::SharedTiles;

/// How many times a key's representative location may be taken.
const SAMPLES_PER_KEY: u8 = 2;

/// A sample value and where it was seen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoSample {
    pub value: f32,
    pub latitude: f64,
    pub longitude: f64,
}

/// Aggregate count for one value, with a representative location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramEntry {
    pub count: u64,
    pub sample: GeoSample,
}

#[derive(Debug, Clone, Copy)]
struct KeyedEntry {
    entry: HistogramEntry,
    samples_taken: u8,
}

/// Histogram keyed by `round(value)`, plus one entry per sampled position of
/// every shared tile group.
#[derive(Debug, Clone, Default)]
pub struct ValueHistogram {
    keyed: BTreeMap<u64, KeyedEntry>,
    shared: Vec<HistogramEntry>,
}

impl ValueHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// `round(value)` as a histogram key. Negative values map to 0.
    pub fn key(value: f32) -> u64 {
        (value as f64 + 0.5) as u64
    }

    /// Count `weight` samples of `value`.
    ///
    /// `locate` is only called when the key's location is (re)sampled.
    pub fn add(&mut self, value: f32, weight: u64, locate: impl FnOnce() -> (f64, f64)) {
        let key = Self::key(value);
        match self.keyed.get_mut(&key) {
            Some(keyed) if keyed.samples_taken >= SAMPLES_PER_KEY => {
                keyed.entry.count += weight;
            }
            Some(keyed) => {
                let (latitude, longitude) = locate();
                keyed.entry.count += weight;
                keyed.entry.sample = GeoSample {
                    value,
                    latitude,
                    longitude,
                };
                keyed.samples_taken += 1;
            }
            None => {
                let (latitude, longitude) = locate();
                self.keyed.insert(
                    key,
                    KeyedEntry {
                        entry: HistogramEntry {
                            count: weight,
                            sample: GeoSample {
                                value,
                                latitude,
                                longitude,
                            },
                        },
                        samples_taken: 1,
                    },
                );
            }
        }
    }

    /// Add an entry that is not merged with any key.
    pub fn push_entry(&mut self, entry: HistogramEntry) {
        self.shared.push(entry);
    }

    /// Number of entries, keyed and unkeyed.
    pub fn len(&self) -> usize {
        self.keyed.len() + self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_count(&self) -> u64 {
        self.keyed.values().map(|k| k.entry.count).sum::<u64>()
            + self.shared.iter().map(|e| e.count).sum::<u64>()
    }

    /// All entries by descending value; ties by latitude, then longitude.
    pub fn into_sorted_entries(self) -> Vec<HistogramEntry> {
        let mut entries: Vec<HistogramEntry> = self
            .keyed
            .into_values()
            .map(|k| k.entry)
            .chain(self.shared)
            .collect();
        entries.sort_by(compare_entries);
        entries
    }
}

fn compare_entries(a: &HistogramEntry, b: &HistogramEntry) -> Ordering {
    b.sample
        .value
        .total_cmp(&a.sample.value)
        .then_with(|| a.sample.latitude.total_cmp(&b.sample.latitude))
        .then_with(|| a.sample.longitude.total_cmp(&b.sample.longitude))
}

/// Builds the value histogram and the statistics derived from it.
pub struct StatsBuilder {
    reader: Arc<TiffReader>,
    shared: Arc<SharedTiles>,
    projection: PixelProjection,
}

impl StatsBuilder {
    pub fn new(reader: Arc<TiffReader>, shared: Arc<SharedTiles>) -> Self {
        let projection = PixelProjection::for_reader(&reader);
        Self {
            reader,
            shared,
            projection,
        }
    }

    pub fn projection(&self) -> &PixelProjection {
        &self.projection
    }

    /// Decode every unique tile in random row/column order, then add the
    /// shared groups.
    pub fn build_histogram(&self, rng: &mut impl Rng) -> Result<ValueHistogram> {
        let start = Instant::now();
        let reader = &self.reader;
        let across = reader.tiles_across();
        let tile_width = reader.tile_width();
        let tile_height = reader.tile_height();
        let offsets = reader.tile_offsets();

        let mut histogram = ValueHistogram::new();
        let mut tile = reader.new_tile_buffer();
        let mut decoded = 0usize;

        let mut rows: Vec<u32> = (0..reader.tiles_down()).collect();
        rows.shuffle(rng);
        for tile_y in rows {
            let mut cols: Vec<u32> = (0..across).collect();
            cols.shuffle(rng);
            for tile_x in cols {
                let position = (tile_y * across + tile_x) as usize;
                if position >= offsets.len() || self.shared.is_shared(offsets[position]) {
                    continue;
                }
                reader.read_tile(position, &mut tile)?;
                decoded += 1;

                for y in 0..tile_height {
                    let row = &tile[(y * tile_width) as usize..((y + 1) * tile_width) as usize];
                    for (x, &value) in row.iter().enumerate() {
                        histogram.add(value, 1, || {
                            self.projection
                                .tile_pixel_to_latlon(tile_x, tile_y, x as u32, y)
                        });
                    }
                }
            }
        }

        debug!(
            unique_tiles = decoded,
            keys = histogram.len(),
            "Unique tiles added to histogram"
        );

        for (_, group) in self.shared.iter() {
            reader.read_tile(group.first_sample(), &mut tile)?;
            let value = tile[0];
            let mass = group.use_count as u64 * tile.len() as u64;
            let n = group.sample_tiles.len() as u64;

            for (i, &position) in group.sample_tiles.iter().enumerate() {
                let mut count = mass / n;
                if i == 0 {
                    count += mass % n;
                }
                let (tile_x, tile_y) = (position as u32 % across, position as u32 / across);
                let (latitude, longitude) =
                    self.projection.tile_pixel_to_latlon(tile_x, tile_y, 0, 0);
                histogram.push_entry(HistogramEntry {
                    count,
                    sample: GeoSample {
                        value,
                        latitude,
                        longitude,
                    },
                });
            }
        }

        info!(
            entries = histogram.len(),
            total_count = histogram.total_count(),
            shared_groups = self.shared.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Value histogram built"
        );

        Ok(histogram)
    }
}
