//! Pixel to geographic coordinate conversion.
//!
//! View-count rasters cover the whole Web Mercator world square, one pixel
//! per tile of the web map pyramid at the raster's zoom level.

use std::f64::consts::PI;

use tiff_parser::TiffReader;

/// Maps raster pixels to latitude/longitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelProjection {
    image_width: u32,
    tile_width: u32,
    tile_height: u32,
    zoom: u32,
}

impl PixelProjection {
    pub fn new(image_width: u32, tile_width: u32, tile_height: u32) -> Self {
        Self {
            image_width,
            tile_width,
            tile_height,
            zoom: zoom_for_width(image_width),
        }
    }

    pub fn for_reader(reader: &TiffReader) -> Self {
        Self::new(reader.image_width(), reader.tile_width(), reader.tile_height())
    }

    /// Zoom level whose tile count matches the raster width.
    pub fn zoom(&self) -> u32 {
        self.zoom
    }

    /// Convert an absolute pixel position to `(latitude, longitude)`.
    pub fn pixel_to_latlon(&self, px: u32, py: u32) -> (f64, f64) {
        let n = 2f64.powi(self.zoom as i32);
        let lng = px as f64 / self.image_width as f64 * 360.0 - 180.0;
        let lat = (PI * (1.0 - 2.0 * py as f64 / n)).sinh().atan().to_degrees();
        (lat, lng)
    }

    /// Convert a pixel inside a tile to `(latitude, longitude)`.
    pub fn tile_pixel_to_latlon(&self, tile_x: u32, tile_y: u32, x: u32, y: u32) -> (f64, f64) {
        self.pixel_to_latlon(tile_x * self.tile_width + x, tile_y * self.tile_height + y)
    }
}

/// `floor(log2(width))`, 0 for an empty raster.
fn zoom_for_width(width: u32) -> u32 {
    if width == 0 {
        0
    } else {
        31 - width.leading_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::assert_approx_eq;

    #[test]
    fn test_zoom_for_width() {
        assert_eq!(zoom_for_width(0), 0);
        assert_eq!(zoom_for_width(1), 0);
        assert_eq!(zoom_for_width(512), 9);
        assert_eq!(zoom_for_width(1000), 9);
        assert_eq!(zoom_for_width(1 << 18), 18);
    }

    #[test]
    fn test_corners() {
        let proj = PixelProjection::new(512, 256, 256);
        let (lat, lng) = proj.pixel_to_latlon(0, 0);
        assert_approx_eq!(lng, -180.0, 1e-9);
        assert_approx_eq!(lat, 85.0511, 1e-3);

        let (lat, lng) = proj.pixel_to_latlon(256, 256);
        assert_approx_eq!(lng, 0.0, 1e-9);
        assert_approx_eq!(lat, 0.0, 1e-9);

        let (lat, _) = proj.pixel_to_latlon(0, 512);
        assert_approx_eq!(lat, -85.0511, 1e-3);
    }

    #[test]
    fn test_tile_pixel_offsets() {
        let proj = PixelProjection::new(512, 256, 256);
        assert_eq!(
            proj.tile_pixel_to_latlon(1, 1, 0, 0),
            proj.pixel_to_latlon(256, 256)
        );
        assert_eq!(
            proj.tile_pixel_to_latlon(0, 1, 10, 3),
            proj.pixel_to_latlon(10, 259)
        );
    }

    #[test]
    fn test_latitude_decreases_downwards() {
        let proj = PixelProjection::new(64, 16, 16);
        let lats: Vec<f64> = (0..64).map(|y| proj.pixel_to_latlon(0, y).0).collect();
        assert!(lats.windows(2).all(|w| w[0] > w[1]));
    }
}
