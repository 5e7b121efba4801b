//! Single-band GeoTIFF decoding and encoding.

use std::io::Cursor;
use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

use crate::error::{Error, Result};
use crate::geo::BoundingBox;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GDAL_NODATA: u16 = 42113;

/// One georeferenced field slice. Row 0 is the northern edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    /// Outer edges of the pixels, not pixel centres.
    pub bounds: BoundingBox,
    pub data: Vec<f32>,
}

impl Raster {
    pub fn new(width: usize, height: usize, bounds: BoundingBox, data: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 || data.len() != width * height {
            return Err(Error::Raster(format!(
                "{} value(s) cannot fill a {}x{} grid",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            bounds,
            data,
        })
    }

    /// Grid step in degrees, `(lon, lat)`.
    pub fn resolution(&self) -> (f64, f64) {
        (
            (self.bounds.lon_max - self.bounds.lon_min) / self.width as f64,
            (self.bounds.lat_max - self.bounds.lat_min) / self.height as f64,
        )
    }

    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.data.get(row * self.width + col).copied()
    }

    /// Decodes a GetCoverage answer.
    ///
    /// Anything that is not a single-band raster with model tiepoint and pixel
    /// scale tags is an [`Error::Raster`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut decoder = Decoder::new(Cursor::new(bytes))?;
        let (width, height) = decoder.dimensions()?;
        match decoder.colortype()? {
            ColorType::Gray(_) => {}
            other => {
                return Err(Error::Raster(format!(
                    "expected a single-band raster, got {:?}",
                    other
                )));
            }
        }

        let scale = decoder
            .find_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))?
            .map(|v| v.into_f64_vec())
            .transpose()?
            .ok_or_else(|| Error::Raster("missing ModelPixelScale tag".into()))?;
        let tiepoint = decoder
            .find_tag(Tag::from_u16_exhaustive(MODEL_TIEPOINT))?
            .map(|v| v.into_f64_vec())
            .transpose()?
            .ok_or_else(|| Error::Raster("missing ModelTiepoint tag".into()))?;
        let nodata = decoder
            .find_tag(Tag::from_u16_exhaustive(GDAL_NODATA))?
            .and_then(|v| v.into_string().ok())
            .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f32>().ok());

        let bounds = georeference(width as usize, height as usize, &scale, &tiepoint)?;

        let mut data = samples_to_f32(decoder.read_image()?)?;
        if let Some(nodata) = nodata {
            for v in data.iter_mut().filter(|v| **v == nodata) {
                *v = f32::NAN;
            }
        }

        Raster::new(width as usize, height as usize, bounds, data)
    }

    /// Encodes as a 32-bit float GeoTIFF readable by [`Raster::decode`].
    pub fn encode_geotiff(&self) -> Result<Vec<u8>> {
        let (sx, sy) = self.resolution();
        let mut buf = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buf)?;
            let (width, height) = (self.width as u32, self.height as u32);
            let mut image = encoder.new_image::<colortype::Gray32Float>(width, height)?;
            image
                .encoder()
                .write_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE), &[sx, sy, 0.0][..])?;
            image.encoder().write_tag(
                Tag::from_u16_exhaustive(MODEL_TIEPOINT),
                &[0.0, 0.0, 0.0, self.bounds.lon_min, self.bounds.lat_max, 0.0][..],
            )?;
            image.write_data(&self.data)?;
        }
        Ok(buf.into_inner())
    }
}

fn georeference(
    width: usize,
    height: usize,
    scale: &[f64],
    tiepoint: &[f64],
) -> Result<BoundingBox> {
    let (&[sx, sy, ..], &[i, j, _, x, y, ..]) = (scale, tiepoint) else {
        return Err(Error::Raster(format!(
            "malformed georeferencing: scale={:?} tiepoint={:?}",
            scale, tiepoint
        )));
    };
    let lon_min = x - i * sx;
    let lat_max = y + j * sy;
    BoundingBox::new(
        lon_min,
        lat_max - height as f64 * sy,
        lon_min + width as f64 * sx,
        lat_max,
    )
    .map_err(|e| Error::Raster(e.to_string()))
}

#[allow(unreachable_patterns)]
fn samples_to_f32(result: DecodingResult) -> Result<Vec<f32>> {
    Ok(match result {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => return Err(Error::Raster("unsupported sample format".into())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Raster {
        let bounds = BoundingBox::new(1.0, 43.0, 1.4, 43.3).unwrap();
        let data = (0..12).map(|v| v as f32 * 0.5).collect();
        Raster::new(4, 3, bounds, data).unwrap()
    }

    #[test]
    fn geotiff_keeps_values_and_bounds() {
        let raster = sample();
        let decoded = Raster::decode(&raster.encode_geotiff().unwrap()).unwrap();
        assert_eq!(decoded.width, 4);
        assert_eq!(decoded.height, 3);
        assert_eq!(decoded.data, raster.data);
        assert!(decoded.bounds.approx_eq(&raster.bounds, 1e-9));
        assert_eq!(decoded.get(3, 2), Some(5.5));
        assert_eq!(decoded.get(4, 0), None);
    }

    #[test]
    fn garbage_is_a_retryable_raster_error() {
        let err = Raster::decode(b"<ows:ExceptionReport/>").unwrap_err();
        assert!(matches!(err, Error::Raster(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn plain_tiff_without_georeferencing_is_rejected() {
        let mut buf = Cursor::new(Vec::new());
        TiffEncoder::new(&mut buf)
            .unwrap()
            .write_image::<colortype::Gray32Float>(2, 2, &[1.0, 2.0, 3.0, 4.0])
            .unwrap();
        assert!(matches!(
            Raster::decode(&buf.into_inner()),
            Err(Error::Raster(msg)) if msg.contains("ModelPixelScale")
        ));
    }

    #[test]
    fn rgb_is_not_single_band() {
        let mut buf = Cursor::new(Vec::new());
        TiffEncoder::new(&mut buf)
            .unwrap()
            .write_image::<colortype::RGB8>(1, 1, &[1, 2, 3])
            .unwrap();
        assert!(matches!(
            Raster::decode(&buf.into_inner()),
            Err(Error::Raster(msg)) if msg.contains("single-band")
        ));
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let bounds = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(Raster::new(2, 2, bounds, vec![0.0; 3]).is_err());
    }
}
