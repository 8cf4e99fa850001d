//! Generators for synthetic view-count tiles.
//!
//! Real view-count rasters are dominated by large constant areas (oceans,
//! deserts) with a few sharp hotspots around cities. These helpers produce
//! small tiles with the same shape so tests can reason about exact values.

/// Creates a tile whose values encode their own position.
///
/// Each sample is `col * 1000 + row`, so a decoded tile can be checked for
/// row-major order and byte order in one comparison.
///
/// ```
/// use test_utils::create_position_tile;
///
/// let tile = create_position_tile(4, 2);
/// assert_eq!(tile.len(), 8);
/// assert_eq!(tile[1], 1000.0); // col=1, row=0
/// assert_eq!(tile[4], 1.0);    // col=0, row=1
/// ```
pub fn create_position_tile(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates a tile with the same value everywhere, like open ocean.
pub fn create_constant_tile(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Creates a tile with one hotspot that decays with distance.
///
/// The peak value sits at `(center_x, center_y)`; values fall off as
/// `peak / (1 + d^2)` which gives the long tail typical of view counts.
pub fn create_hotspot_tile(
    width: usize,
    height: usize,
    center_x: f32,
    center_y: f32,
    peak: f32,
) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let dx = col as f32 - center_x;
            let dy = row as f32 - center_y;
            data.push(peak / (1.0 + dx * dx + dy * dy));
        }
    }
    data
}

/// Creates a tile whose values climb linearly from `0` to `max` in row-major
/// order. Every sample is distinct.
pub fn create_ramp_tile(width: usize, height: usize, max: f32) -> Vec<f32> {
    let len = width * height;
    let denom = (len.max(2) - 1) as f32;
    (0..len).map(|i| i as f32 / denom * max).collect()
}
