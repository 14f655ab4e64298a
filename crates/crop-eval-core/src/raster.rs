//! In-memory multi-band raster with an affine geotransform, and polygon
//! masking.
//!
//! Storage is one row-major `Vec<f64>` per band. A decoded [`Raster`] is
//! immutable and shared read-only by every aggregation worker.
//!
//! Masking follows rasterio's `mask(..., crop=True)`: the output window is the
//! geometry's bounding box clipped to the raster, and a pixel belongs to the
//! field when its centre lies inside the geometry.

use crate::error::{MaskError, RasterError};
use crate::geometry::{Bounds, FieldGeometry};

/// GDAL-order affine transform:
///   x = origin_x + col · pixel_width  + row · row_rotation
///   y = origin_y + col · col_rotation + row · pixel_height
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    /// Negative for north-up rasters.
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square-or-rectangular pixels.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    /// Identity-like transform: pixel (col, row) covers world [col, col+1) × (−row−1, −row].
    pub fn unit() -> Self {
        Self::north_up(0.0, 0.0, 1.0, 1.0)
    }

    pub fn is_north_up(&self) -> bool {
        self.row_rotation == 0.0
            && self.col_rotation == 0.0
            && self.pixel_width != 0.0
            && self.pixel_height != 0.0
    }

    /// World coordinates of the centre of pixel (col, row).
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            self.origin_x + c * self.pixel_width + r * self.row_rotation,
            self.origin_y + c * self.col_rotation + r * self.pixel_height,
        )
    }

    /// Fractional (col, row) of a world point. North-up only.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.origin_x) / self.pixel_width, (y - self.origin_y) / self.pixel_height)
    }

    /// Transform of a sub-window starting at (col0, row0).
    pub fn shifted(&self, col0: usize, row0: usize) -> Self {
        let (x, y) = (
            self.origin_x + col0 as f64 * self.pixel_width + row0 as f64 * self.row_rotation,
            self.origin_y + col0 as f64 * self.col_rotation + row0 as f64 * self.pixel_height,
        );
        Self { origin_x: x, origin_y: y, ..*self }
    }

    /// Pixel window covering `b`, clipped to a `width`×`height` grid.
    /// `None` when the clipped window is empty.
    pub fn window(&self, b: &Bounds, width: usize, height: usize) -> Option<Window> {
        let (c0, r0) = self.world_to_pixel(b.min_x, b.max_y);
        let (c1, r1) = self.world_to_pixel(b.max_x, b.min_y);
        let (cmin, cmax) = (c0.min(c1), c0.max(c1));
        let (rmin, rmax) = (r0.min(r1), r0.max(r1));

        let col_start = cmin.floor().max(0.0);
        let row_start = rmin.floor().max(0.0);
        let col_end = cmax.ceil().min(width as f64);
        let row_end = rmax.ceil().min(height as f64);
        if col_end <= col_start || row_end <= row_start {
            return None;
        }
        Some(Window {
            col0: col_start as usize,
            row0: row_start as usize,
            cols: (col_end - col_start) as usize,
            rows: (row_end - row_start) as usize,
        })
    }
}

/// Rectangular pixel window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub col0: usize,
    pub row0: usize,
    pub cols: usize,
    pub rows: usize,
}

/// Decoded multi-band raster.
#[derive(Debug, Clone)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    /// Source nodata value, if declared.
    pub nodata: Option<f64>,
    bands: Vec<Vec<f64>>,
}

impl Raster {
    /// Build from band-sequential buffers, one per band.
    pub fn new(
        width: usize,
        height: usize,
        bands: Vec<Vec<f64>>,
        transform: GeoTransform,
        nodata: Option<f64>,
    ) -> Result<Self, RasterError> {
        for b in &bands {
            if b.len() != width * height {
                return Err(RasterError::Shape { len: b.len(), width, height });
            }
        }
        Ok(Self { width, height, transform, nodata, bands })
    }

    /// Build from a pixel-interleaved buffer (TIFF chunky layout).
    pub fn from_interleaved(
        data: &[f64],
        width: usize,
        height: usize,
        transform: GeoTransform,
        nodata: Option<f64>,
    ) -> Result<Self, RasterError> {
        let n_px = width * height;
        if n_px == 0 || data.is_empty() || data.len() % n_px != 0 {
            return Err(RasterError::Shape { len: data.len(), width, height });
        }
        let n_bands = data.len() / n_px;
        let mut bands = vec![Vec::with_capacity(n_px); n_bands];
        for px in data.chunks_exact(n_bands) {
            for (band, &v) in bands.iter_mut().zip(px) {
                band.push(v);
            }
        }
        Ok(Self { width, height, transform, nodata, bands })
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn band(&self, band: usize) -> Option<&[f64]> {
        self.bands.get(band).map(Vec::as_slice)
    }

    #[inline]
    pub fn get(&self, band: usize, row: usize, col: usize) -> f64 {
        self.bands[band][row * self.width + col]
    }

    fn is_source_nodata(&self, v: f64) -> bool {
        v.is_nan() || self.nodata.is_some_and(|nd| v == nd)
    }

    /// Clip `bands` to `geometry`. Pixels outside the geometry, and pixels
    /// that are nodata in the source, are set to `fill`.
    pub fn mask(
        &self,
        geometry: &FieldGeometry,
        fill: f64,
        bands: &[usize],
    ) -> Result<MaskedWindow, MaskError> {
        geometry.validate()?;
        if !self.transform.is_north_up() {
            return Err(MaskError::RotatedTransform);
        }
        if let Some(&band) = bands.iter().find(|&&b| b >= self.bands.len()) {
            return Err(MaskError::BandOutOfRange { band, count: self.bands.len() });
        }

        let window = geometry
            .bounds()
            .and_then(|b| self.transform.window(&b, self.width, self.height));
        let Some(w) = window else {
            return Ok(MaskedWindow {
                cols: 0,
                rows: 0,
                fill,
                transform: self.transform,
                bands: vec![Vec::new(); bands.len()],
            });
        };

        let mut out = vec![Vec::with_capacity(w.cols * w.rows); bands.len()];
        for row in w.row0..w.row0 + w.rows {
            for col in w.col0..w.col0 + w.cols {
                let (x, y) = self.transform.pixel_center(col, row);
                let inside = geometry.contains(x, y);
                for (dst, &band) in out.iter_mut().zip(bands) {
                    let v = self.get(band, row, col);
                    dst.push(if inside && !self.is_source_nodata(v) { v } else { fill });
                }
            }
        }

        Ok(MaskedWindow {
            cols: w.cols,
            rows: w.rows,
            fill,
            transform: self.transform.shifted(w.col0, w.row0),
            bands: out,
        })
    }
}

/// Output of [`Raster::mask`]: the requested bands cropped to the field's
/// window, in request order.
#[derive(Debug, Clone)]
pub struct MaskedWindow {
    pub cols: usize,
    pub rows: usize,
    pub fill: f64,
    pub transform: GeoTransform,
    pub bands: Vec<Vec<f64>>,
}

impl MaskedWindow {
    pub fn is_empty(&self) -> bool {
        self.cols == 0 || self.rows == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{rect, FieldGeometry, Polygon};

    /// 4×4 raster, origin (0, 4), 1-unit pixels; band 0 = row*4+col.
    fn grid() -> Raster {
        let idx: Vec<f64> = (0..16).map(f64::from).collect();
        let ones = vec![1.0; 16];
        let t = GeoTransform::north_up(0.0, 4.0, 1.0, 1.0);
        Raster::new(4, 4, vec![idx, ones], t, None).unwrap()
    }

    #[test]
    fn pixel_center_north_up() {
        let t = GeoTransform::north_up(100.0, 50.0, 10.0, 10.0);
        assert_eq!(t.pixel_center(0, 0), (105.0, 45.0));
        assert_eq!(t.pixel_center(2, 1), (125.0, 35.0));
    }

    #[test]
    fn window_is_clipped_to_raster() {
        let t = GeoTransform::north_up(0.0, 4.0, 1.0, 1.0);
        let b = Bounds { min_x: -3.0, min_y: 2.5, max_x: 1.5, max_y: 9.0 };
        let w = t.window(&b, 4, 4).unwrap();
        assert_eq!(w, Window { col0: 0, row0: 0, cols: 2, rows: 2 });
        let outside = Bounds { min_x: 10.0, min_y: 10.0, max_x: 12.0, max_y: 12.0 };
        assert!(t.window(&outside, 4, 4).is_none());
    }

    #[test]
    fn mask_crops_and_fills_outside_pixels() {
        let r = grid();
        // Hypotenuse y = x + 1.8; the window is the 3×3 block under the bbox.
        let tri = FieldGeometry::Polygon(Polygon::new(vec![[0.0, 4.0], [2.2, 4.0], [0.0, 1.8]]));
        let m = r.mask(&tri, -99.0, &[0]).unwrap();
        assert_eq!((m.cols, m.rows), (3, 3));
        let nd = -99.0;
        assert_eq!(m.bands[0], vec![0.0, 1.0, nd, 4.0, nd, nd, nd, nd, nd]);
        assert_eq!(m.transform.origin_y, 4.0);
    }

    #[test]
    fn mask_full_cover_keeps_every_pixel() {
        let r = grid();
        let m = r.mask(&rect(0.0, 0.0, 4.0, 4.0), -99.0, &[0, 1]).unwrap();
        assert_eq!(m.bands[0].len(), 16);
        assert!(m.bands[0].iter().all(|&v| v != -99.0));
        assert!(m.bands[1].iter().all(|&v| v == 1.0));
    }

    #[test]
    fn mask_outside_raster_is_empty_not_error() {
        let r = grid();
        let m = r.mask(&rect(50.0, 50.0, 60.0, 60.0), -99.0, &[0, 1]).unwrap();
        assert!(m.is_empty());
        assert_eq!(m.bands.len(), 2);
    }

    #[test]
    fn source_nodata_becomes_fill() {
        let mut band = vec![5.0; 4];
        band[3] = 255.0;
        band[1] = f64::NAN;
        let t = GeoTransform::north_up(0.0, 2.0, 1.0, 1.0);
        let r = Raster::new(2, 2, vec![band], t, Some(255.0)).unwrap();
        let m = r.mask(&rect(0.0, 0.0, 2.0, 2.0), -99.0, &[0]).unwrap();
        assert_eq!(m.bands[0], vec![5.0, -99.0, 5.0, -99.0]);
    }

    #[test]
    fn mask_rejects_bad_band_and_rotation() {
        let r = grid();
        assert_eq!(
            r.mask(&rect(0.0, 0.0, 1.0, 1.0), -99.0, &[0, 7]).unwrap_err(),
            MaskError::BandOutOfRange { band: 7, count: 2 }
        );
        let mut rotated = grid();
        rotated.transform.row_rotation = 0.1;
        assert_eq!(
            rotated.mask(&rect(0.0, 0.0, 1.0, 1.0), -99.0, &[0]).unwrap_err(),
            MaskError::RotatedTransform
        );
    }

    #[test]
    fn interleaved_buffer_splits_into_bands() {
        let data = [1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0];
        let r = Raster::from_interleaved(&data, 2, 2, GeoTransform::unit(), None).unwrap();
        assert_eq!(r.band_count(), 2);
        assert_eq!(r.band(0).unwrap(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(r.band(1).unwrap(), &[10.0, 20.0, 30.0, 40.0]);
        assert!(Raster::from_interleaved(&data[..7], 2, 2, GeoTransform::unit(), None).is_err());
    }
}
