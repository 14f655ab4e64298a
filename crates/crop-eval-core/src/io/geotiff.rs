//! GeoTIFF decoding into a [`Raster`].
//!
//! Only the parts of GeoTIFF needed to place pixels are read: the
//! ModelPixelScale + ModelTiepoint pair or a ModelTransformation matrix, and
//! GDAL's nodata tag. Samples of every integer and float type are widened
//! to f64. Bands must be pixel-interleaved (PlanarConfiguration = 1).

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tracing::debug;

use crate::error::RasterError;
use crate::raster::{GeoTransform, Raster};

fn tiff_err(path: &Path) -> impl FnOnce(tiff::TiffError) -> RasterError + '_ {
    move |source| RasterError::Tiff { path: path.to_path_buf(), source }
}

fn format_err(path: &Path, reason: impl Into<String>) -> RasterError {
    RasterError::Format { path: path.to_path_buf(), reason: reason.into() }
}

/// Decode the first image of the GeoTIFF at `path`.
pub fn read_raster(path: &Path) -> Result<Raster, RasterError> {
    let file = File::open(path)
        .map_err(|source| RasterError::Io { path: path.to_path_buf(), source })?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(tiff_err(path))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions().map_err(tiff_err(path))?;
    let (width, height) = (width as usize, height as usize);

    let scale = f64_tag(&mut decoder, Tag::ModelPixelScaleTag, path)?;
    let tiepoint = f64_tag(&mut decoder, Tag::ModelTiepointTag, path)?;
    let matrix = f64_tag(&mut decoder, Tag::ModelTransformationTag, path)?;
    let transform = geo_transform(scale.as_deref(), tiepoint.as_deref(), matrix.as_deref())
        .ok_or_else(|| format_err(path, "no usable georeferencing tags"))?;

    let nodata = match decoder.find_tag(Tag::GdalNodata).map_err(tiff_err(path))? {
        Some(v) => {
            let text = v.into_string().map_err(tiff_err(path))?;
            let text = text.trim_matches(char::from(0)).trim();
            let value = text
                .parse::<f64>()
                .map_err(|_| format_err(path, format!("unparseable nodata value '{text}'")))?;
            Some(value)
        }
        None => None,
    };

    let data = match decoder.read_image().map_err(tiff_err(path))? {
        DecodingResult::U8(v) => widen(v),
        DecodingResult::U16(v) => widen(v),
        DecodingResult::U32(v) => widen(v),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => widen(v),
        DecodingResult::I16(v) => widen(v),
        DecodingResult::I32(v) => widen(v),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => widen(v),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => return Err(format_err(path, "unsupported sample type")),
    };

    let raster = Raster::from_interleaved(&data, width, height, transform, nodata)?;
    debug!(
        event = "raster.decoded",
        path = %path.display(),
        width,
        height,
        bands = raster.band_count(),
        nodata = ?nodata,
    );
    Ok(raster)
}

fn widen<T: Into<f64>>(v: Vec<T>) -> Vec<f64> {
    v.into_iter().map(Into::into).collect()
}

fn f64_tag<R>(
    decoder: &mut Decoder<R>,
    tag: Tag,
    path: &Path,
) -> Result<Option<Vec<f64>>, RasterError>
where
    R: std::io::Read + std::io::Seek,
{
    decoder
        .find_tag(tag)
        .and_then(|v| v.map(|v| v.into_f64_vec()).transpose())
        .map_err(tiff_err(path))
}

/// Affine transform from GeoTIFF model tags. A transformation matrix wins
/// over scale + tiepoint; the tiepoint may reference any raster position.
fn geo_transform(
    scale: Option<&[f64]>,
    tiepoint: Option<&[f64]>,
    matrix: Option<&[f64]>,
) -> Option<GeoTransform> {
    if let Some(m) = matrix.filter(|m| m.len() >= 8) {
        return Some(GeoTransform {
            origin_x: m[3],
            pixel_width: m[0],
            row_rotation: m[1],
            origin_y: m[7],
            col_rotation: m[4],
            pixel_height: m[5],
        });
    }
    let (s, t) = (scale?, tiepoint?);
    if s.len() < 2 || t.len() < 6 {
        return None;
    }
    let (sx, sy) = (s[0], s[1]);
    let (i, j, x, y) = (t[0], t[1], t[3], t[4]);
    Some(GeoTransform::north_up(x - i * sx, y + j * sy, sx, sy))
}

/// Write a north-up raster as a 64-bit float GeoTIFF. Supports 1, 3 or 4
/// bands.
pub fn write_raster(path: &Path, raster: &Raster) -> Result<(), RasterError> {
    let t = &raster.transform;
    if !t.is_north_up() {
        return Err(format_err(path, "only north-up rasters can be written"));
    }
    let file = File::create(path)
        .map_err(|source| RasterError::Io { path: path.to_path_buf(), source })?;
    let mut tiff = TiffEncoder::new(BufWriter::new(file)).map_err(tiff_err(path))?;

    let bands: Vec<&[f64]> = (0..raster.band_count()).filter_map(|b| raster.band(b)).collect();
    let n_px = raster.width * raster.height;
    let mut data = Vec::with_capacity(n_px * bands.len());
    for px in 0..n_px {
        data.extend(bands.iter().map(|b| b[px]));
    }

    let scale = [t.pixel_width, -t.pixel_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
    let nodata = raster.nodata.map(|v| v.to_string());
    let (w, h) = (raster.width as u32, raster.height as u32);

    macro_rules! encode {
        ($color:ty) => {{
            let mut image = tiff.new_image::<$color>(w, h).map_err(tiff_err(path))?;
            let dir = image.encoder();
            dir.write_tag(Tag::ModelPixelScaleTag, &scale[..]).map_err(tiff_err(path))?;
            dir.write_tag(Tag::ModelTiepointTag, &tiepoint[..]).map_err(tiff_err(path))?;
            if let Some(nd) = &nodata {
                dir.write_tag(Tag::GdalNodata, nd.as_str()).map_err(tiff_err(path))?;
            }
            image.write_data(&data).map_err(tiff_err(path))?;
        }};
    }

    match bands.len() {
        1 => encode!(colortype::Gray64Float),
        3 => encode!(colortype::RGB64Float),
        4 => encode!(colortype::RGBA64Float),
        n => return Err(format_err(path, format!("cannot encode {n} bands"))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiepoint_at_origin() {
        let tie = [0.0, 0.0, 0.0, 500.0, 900.0, 0.0];
        let t = geo_transform(Some(&[10.0, 10.0, 0.0]), Some(&tie), None).unwrap();
        assert_eq!(t, GeoTransform::north_up(500.0, 900.0, 10.0, 10.0));
    }

    #[test]
    fn tiepoint_elsewhere_is_shifted_back() {
        let tie = [4.0, 5.0, 0.0, 100.0, 200.0, 0.0];
        let t = geo_transform(Some(&[2.0, 3.0, 0.0]), Some(&tie), None).unwrap();
        assert_eq!(t.origin_x, 92.0);
        assert_eq!(t.origin_y, 215.0);
        assert_eq!(t.pixel_height, -3.0);
    }

    #[test]
    fn matrix_takes_precedence() {
        let m = [
            5.0, 0.0, 0.0, 1000.0, //
            0.0, -5.0, 0.0, 2000.0, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        let t = geo_transform(Some(&[1.0, 1.0, 0.0]), Some(&[0.0; 6]), Some(&m)).unwrap();
        assert_eq!(t, GeoTransform::north_up(1000.0, 2000.0, 5.0, 5.0));
    }

    #[test]
    fn missing_tags() {
        assert!(geo_transform(None, None, None).is_none());
        assert!(geo_transform(Some(&[1.0, 1.0]), None, None).is_none());
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pred.tif");
        let bands = vec![
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            vec![0.0; 6],
            vec![7.0, 7.0, 3.0, 7.0, 3.0, -1.0],
            vec![0.9, 0.8, 0.4, 0.7, 0.5, 0.3],
        ];
        let t = GeoTransform::north_up(100.0, 50.0, 10.0, 10.0);
        let src = Raster::new(3, 2, bands, t, Some(-1.0)).unwrap();
        write_raster(&path, &src).unwrap();

        let back = read_raster(&path).unwrap();
        assert_eq!((back.width, back.height, back.band_count()), (3, 2, 4));
        assert_eq!(back.transform, src.transform);
        assert_eq!(back.nodata, Some(-1.0));
        for b in 0..4 {
            assert_eq!(back.band(b), src.band(b));
        }
    }

    #[test]
    fn two_bands_are_rejected_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let r = Raster::new(1, 1, vec![vec![0.0], vec![1.0]], GeoTransform::unit(), None).unwrap();
        assert!(matches!(
            write_raster(&dir.path().join("x.tif"), &r),
            Err(RasterError::Format { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_raster(Path::new("/nonexistent/pred.tif")).unwrap_err();
        assert!(matches!(err, RasterError::Io { .. }));
    }
}
