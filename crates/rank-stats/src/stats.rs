//! Rank/value curve and median.
//!
//! The sorted histogram is walked once, accumulating ranks. Points are placed
//! in a 1000x1000 log-log plotting space and a point is kept only if it lies
//! at least 4 units from the previously kept one, so a curve of several
//! hundred thousand entries shrinks to a few thousand without losing shape.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RankError, Result};
use crate::histogram::{HistogramEntry, StatsBuilder};

/// Side length of the plotting space used for thinning.
const PLOT_SIZE: f64 = 1000.0;

/// Squared distance a point must keep from the last kept point.
const MIN_DISTANCE_SQUARED: f64 = 16.0;

/// One point of the rank/value curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSample {
    pub latitude: f64,
    pub longitude: f64,
    pub rank: u64,
    pub value: f32,
}

/// Thinned rank/value curve.
///
/// Serialized as `{"Median": n, "Samples": [[[lat, lng], rank, value], ...]}`,
/// the layout consumed by the plotting and serving side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireStats", from = "WireStats")]
pub struct Stats {
    /// Index into `samples` of the first sample at or past half the total.
    pub median: usize,
    /// Samples ordered by non-decreasing rank.
    pub samples: Vec<StatsSample>,
}

impl Stats {
    pub fn median_sample(&self) -> Option<&StatsSample> {
        self.samples.get(self.median)
    }

    /// Rank of the last sample, equal to the total weighted count.
    pub fn total_count(&self) -> u64 {
        self.samples.last().map(|s| s.rank).unwrap_or(0)
    }
}

#[derive(Serialize, Deserialize)]
struct WireStats {
    #[serde(rename = "Median")]
    median: usize,
    #[serde(rename = "Samples")]
    samples: Vec<WireSample>,
}

#[derive(Serialize, Deserialize)]
struct WireSample((f64, f64), u64, f32);

impl From<Stats> for WireStats {
    fn from(stats: Stats) -> Self {
        Self {
            median: stats.median,
            samples: stats
                .samples
                .into_iter()
                .map(|s| WireSample((s.latitude, s.longitude), s.rank, s.value))
                .collect(),
        }
    }
}

impl From<WireStats> for Stats {
    fn from(wire: WireStats) -> Self {
        Self {
            median: wire.median,
            samples: wire
                .samples
                .into_iter()
                .map(|WireSample((latitude, longitude), rank, value)| StatsSample {
                    latitude,
                    longitude,
                    rank,
                    value,
                })
                .collect(),
        }
    }
}

/// Build the thinned curve from entries sorted by descending value.
pub fn calc_stats(entries: &[HistogramEntry]) -> Result<Stats> {
    if entries.is_empty() {
        return Err(RankError::empty_raster("histogram has no entries"));
    }

    let total: u64 = entries.iter().map(|e| e.count).sum();
    if total == 0 {
        return Err(RankError::empty_raster("histogram has zero total count"));
    }

    let max_value = entries
        .iter()
        .map(|e| e.sample.value)
        .fold(f32::NEG_INFINITY, f32::max);
    let scale_x = finite_or_zero(PLOT_SIZE / (total as f64).log10());
    let scale_y = finite_or_zero(PLOT_SIZE / (max_value as f64).log10());

    let mut samples = Vec::new();
    let mut median = None;
    let (mut last_x, mut last_y) = (0.0f64, 0.0f64);
    let mut rank: u64 = 1;

    for (i, entry) in entries.iter().enumerate() {
        let x = ((rank as f64).log10() * scale_x).max(0.0);
        let y = ((entry.sample.value as f64).log10() * scale_y).max(0.0);
        let distance = (x - last_x) * (x - last_x) + (y - last_y) * (y - last_y);

        let is_last = i == entries.len() - 1;
        if is_last {
            rank = total;
        }

        if distance >= MIN_DISTANCE_SQUARED || is_last {
            samples.push(StatsSample {
                latitude: entry.sample.latitude,
                longitude: entry.sample.longitude,
                rank,
                value: entry.sample.value,
            });
            (last_x, last_y) = (x, y);
            if median.is_none() && rank >= total / 2 {
                median = Some(samples.len() - 1);
            }
        }

        rank += entry.count;
    }

    // The last sample has rank == total, so a median is always found.
    let median = median.unwrap_or(samples.len() - 1);

    debug!(
        entries = entries.len(),
        samples = samples.len(),
        median = median,
        total_count = total,
        "Statistics computed"
    );

    Ok(Stats { median, samples })
}

/// `f64::max` ignores NaN, so non-finite scales are zeroed explicitly.
fn finite_or_zero(scale: f64) -> f64 {
    if scale.is_finite() {
        scale
    } else {
        0.0
    }
}

impl StatsBuilder {
    /// Build the histogram and derive the thinned curve from it.
    pub fn build(&self, rng: &mut impl Rng) -> Result<Stats> {
        let entries = self.build_histogram(rng)?.into_sorted_entries();
        calc_stats(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::GeoSample;

    fn entry(value: f32, count: u64) -> HistogramEntry {
        HistogramEntry {
            count,
            sample: GeoSample {
                value,
                latitude: value as f64,
                longitude: -(value as f64),
            },
        }
    }

    #[test]
    fn test_empty_is_rejected() {
        assert!(matches!(calc_stats(&[]), Err(RankError::EmptyRaster(_))));
        assert!(matches!(
            calc_stats(&[entry(3.0, 0)]),
            Err(RankError::EmptyRaster(_))
        ));
    }

    #[test]
    fn test_single_entry() {
        let stats = calc_stats(&[entry(3.0, 7)]).unwrap();
        assert_eq!(stats.samples.len(), 1);
        assert_eq!(stats.samples[0].rank, 7);
        assert_eq!(stats.median, 0);
    }

    #[test]
    fn test_ranks_and_median() {
        let entries = [
            entry(1000.0, 1),
            entry(100.0, 9),
            entry(10.0, 90),
            entry(2.0, 900),
        ];
        let stats = calc_stats(&entries).unwrap();

        let ranks: Vec<u64> = stats.samples.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 2, 11, 1000]);
        // total / 2 = 500: only the last sample reaches it.
        assert_eq!(stats.median, 3);
        assert_eq!(stats.total_count(), 1000);
        assert_eq!(stats.median_sample().unwrap().value, 2.0);
    }

    #[test]
    fn test_close_points_are_thinned() {
        // 1000 entries with nearly equal values: consecutive points sit close
        // together in plotting space.
        let entries: Vec<HistogramEntry> = (0..1000)
            .map(|i| entry(10_000.0 - i as f32 * 0.001, 1))
            .collect();
        let stats = calc_stats(&entries).unwrap();

        assert!(stats.samples.len() < entries.len());
        assert_eq!(stats.samples.last().unwrap().rank, 1000);
        assert!(stats.samples.windows(2).all(|w| w[0].rank <= w[1].rank));
        assert!(stats.median_sample().unwrap().rank >= 500);
    }

    #[test]
    fn test_wire_layout() {
        let stats = Stats {
            median: 1,
            samples: vec![
                StatsSample {
                    latitude: 47.5,
                    longitude: 8.5,
                    rank: 1,
                    value: 250.0,
                },
                StatsSample {
                    latitude: -10.0,
                    longitude: 20.0,
                    rank: 42,
                    value: 0.5,
                },
            ],
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert_eq!(
            json,
            r#"{"Median":1,"Samples":[[[47.5,8.5],1,250.0],[[-10.0,20.0],42,0.5]]}"#
        );

        let parsed: Stats = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, stats);
    }
}
