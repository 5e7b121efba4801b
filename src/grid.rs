//! Time-indexed 3-D grid assembled from per-timestamp rasters.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::geo::BoundingBox;
use crate::raster::Raster;
use crate::util::iso_hour;

/// Bounds of rasters stacked together may differ by this much, in degrees.
const BOUNDS_TOLERANCE: f64 = 1e-9;

/// What to do with a timestamp whose raster could not be fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingSlicePolicy {
    /// Abort the whole assembly.
    #[default]
    Fail,
    /// Keep the slot as a NaN-filled slice and list it in [`Grid3D::gaps`].
    Gap,
}

/// Dense `(y, x, time)` array with its coordinate axes.
#[derive(Debug, Clone)]
pub struct Grid3D {
    width: usize,
    height: usize,
    bounds: BoundingBox,
    lons: Vec<f64>,
    lats: Vec<f64>,
    times: Vec<DateTime<Utc>>,
    gaps: Vec<usize>,
    data: Vec<f32>,
}

impl Grid3D {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Pixel-centre longitudes, west to east.
    pub fn lons(&self) -> &[f64] {
        &self.lons
    }

    /// Pixel-centre latitudes, north to south.
    pub fn lats(&self) -> &[f64] {
        &self.lats
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    /// Indices of time slots that are NaN-filled gaps.
    pub fn gaps(&self) -> &[usize] {
        &self.gaps
    }

    /// `(height, width, times)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.times.len())
    }

    /// Grid step in degrees, `(lon, lat)`.
    pub fn resolution(&self) -> (f64, f64) {
        (
            (self.bounds.lon_max - self.bounds.lon_min) / self.width as f64,
            (self.bounds.lat_max - self.bounds.lat_min) / self.height as f64,
        )
    }

    pub fn get(&self, y: usize, x: usize, t: usize) -> Option<f32> {
        if y >= self.height || x >= self.width || t >= self.times.len() {
            return None;
        }
        self.data.get(self.index(y, x, t)).copied()
    }

    /// Row-major copy of time slice `t`.
    pub fn slice(&self, t: usize) -> Option<Vec<f32>> {
        if t >= self.times.len() {
            return None;
        }
        let mut out = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                out.push(self.data[self.index(y, x, t)]);
            }
        }
        Some(out)
    }

    /// Time slice `t` as a stand-alone raster.
    pub fn slice_raster(&self, t: usize) -> Option<Raster> {
        let data = self.slice(t)?;
        Raster::new(self.width, self.height, self.bounds, data).ok()
    }

    /// Smallest and largest finite value over the whole grid.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    #[inline]
    fn index(&self, y: usize, x: usize, t: usize) -> usize {
        (y * self.width + x) * self.times.len() + t
    }
}

/// Collects rasters in request order and stacks them into a [`Grid3D`].
#[derive(Debug)]
pub struct GridAssembler {
    policy: MissingSlicePolicy,
    slots: Vec<(DateTime<Utc>, Option<Raster>)>,
}

impl GridAssembler {
    pub fn new(policy: MissingSlicePolicy) -> Self {
        Self {
            policy,
            slots: Vec::new(),
        }
    }

    /// Adds the raster of the next timestamp, checking it against the first one.
    pub fn push(&mut self, time: DateTime<Utc>, raster: Raster) -> Result<()> {
        if let Some(reference) = self.slots.iter().find_map(|(_, r)| r.as_ref()) {
            check_consistent(reference, &raster, &time)?;
        }
        self.slots.push((time, Some(raster)));
        Ok(())
    }

    /// Records a timestamp whose raster is unavailable; `cause` is returned under
    /// [`MissingSlicePolicy::Fail`].
    pub fn push_missing(&mut self, time: DateTime<Utc>, cause: Error) -> Result<()> {
        match self.policy {
            MissingSlicePolicy::Fail => Err(cause),
            MissingSlicePolicy::Gap => {
                self.slots.push((time, None));
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn finish(self) -> Result<Grid3D> {
        let reference = self
            .slots
            .iter()
            .find_map(|(_, r)| r.as_ref())
            .ok_or(Error::EmptyGrid)?;
        let (width, height, bounds) = (reference.width, reference.height, reference.bounds);
        let n = self.slots.len();

        let (dx, dy) = reference.resolution();
        let lons = (0..width)
            .map(|c| bounds.lon_min + (c as f64 + 0.5) * dx)
            .collect();
        let lats = (0..height)
            .map(|r| bounds.lat_max - (r as f64 + 0.5) * dy)
            .collect();

        let mut data = vec![f32::NAN; width * height * n];
        let mut times = Vec::with_capacity(n);
        let mut gaps = Vec::new();
        for (t, (time, raster)) in self.slots.iter().enumerate() {
            times.push(*time);
            match raster {
                Some(raster) => {
                    for (i, v) in raster.data.iter().enumerate() {
                        data[i * n + t] = *v;
                    }
                }
                None => gaps.push(t),
            }
        }

        Ok(Grid3D {
            width,
            height,
            bounds,
            lons,
            lats,
            times,
            gaps,
            data,
        })
    }
}

fn check_consistent(reference: &Raster, raster: &Raster, time: &DateTime<Utc>) -> Result<()> {
    if reference.width != raster.width
        || reference.height != raster.height
        || !reference.bounds.approx_eq(&raster.bounds, BOUNDS_TOLERANCE)
    {
        return Err(Error::ShapeMismatch {
            time: iso_hour(time),
            expected: describe(reference),
            found: describe(raster),
        });
    }
    Ok(())
}

fn describe(r: &Raster) -> String {
    format!("{}x{} over {}", r.width, r.height, r.bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 3, 24, 7, 0, 0).unwrap() + Duration::hours(i)
    }

    fn raster(width: usize, height: usize, fill: f32) -> Raster {
        let (lon_max, lat_max) = (1.0 + width as f64 * 0.1, 43.0 + height as f64 * 0.1);
        let bounds = BoundingBox::new(1.0, 43.0, lon_max, lat_max).unwrap();
        let data = (0..width * height).map(|i| fill + i as f32).collect();
        Raster::new(width, height, bounds, data).unwrap()
    }

    #[test]
    fn stacks_slices_in_request_order() {
        let mut asm = GridAssembler::new(MissingSlicePolicy::Fail);
        for i in 0..4 {
            asm.push(t(i), raster(3, 2, 100.0 * i as f32)).unwrap();
        }
        let grid = asm.finish().unwrap();
        assert_eq!(grid.shape(), (2, 3, 4));
        assert_eq!(grid.times(), &[t(0), t(1), t(2), t(3)]);
        assert_eq!(grid.get(0, 0, 2), Some(200.0));
        assert_eq!(grid.get(1, 2, 3), Some(305.0));
        assert_eq!(grid.slice(1).unwrap(), raster(3, 2, 100.0).data);
        assert!(grid.gaps().is_empty());
    }

    #[test]
    fn coordinates_are_pixel_centres() {
        let mut asm = GridAssembler::new(MissingSlicePolicy::Fail);
        asm.push(t(0), raster(2, 2, 0.0)).unwrap();
        let grid = asm.finish().unwrap();
        assert!((grid.lons()[0] - 1.05).abs() < 1e-12);
        assert!((grid.lons()[1] - 1.15).abs() < 1e-12);
        assert!((grid.lats()[0] - 43.15).abs() < 1e-12);
        assert!((grid.lats()[1] - 43.05).abs() < 1e-12);
    }

    #[test]
    fn shape_mismatch_aborts() {
        let mut asm = GridAssembler::new(MissingSlicePolicy::Gap);
        asm.push(t(0), raster(3, 2, 0.0)).unwrap();
        let err = asm.push(t(1), raster(2, 3, 0.0)).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));

        let mut shifted = raster(3, 2, 0.0);
        shifted.bounds.lon_min += 0.01;
        assert!(matches!(
            asm.push(t(1), shifted),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn missing_slot_policies() {
        let mut asm = GridAssembler::new(MissingSlicePolicy::Fail);
        asm.push(t(0), raster(2, 2, 0.0)).unwrap();
        assert!(matches!(
            asm.push_missing(t(1), Error::EmptyGrid),
            Err(Error::EmptyGrid)
        ));

        let mut asm = GridAssembler::new(MissingSlicePolicy::Gap);
        asm.push(t(0), raster(2, 2, 0.0)).unwrap();
        asm.push_missing(t(1), Error::Cancelled).unwrap();
        asm.push(t(2), raster(2, 2, 10.0)).unwrap();
        let grid = asm.finish().unwrap();
        assert_eq!(grid.shape(), (2, 2, 3));
        assert_eq!(grid.gaps(), &[1]);
        assert!(grid.get(0, 0, 1).unwrap().is_nan());
        assert_eq!(grid.get(0, 0, 2), Some(10.0));
        assert_eq!(grid.value_range(), Some((0.0, 13.0)));
    }

    #[test]
    fn nothing_fetched_is_an_error() {
        let mut asm = GridAssembler::new(MissingSlicePolicy::Gap);
        asm.push_missing(t(0), Error::Cancelled).unwrap();
        assert!(matches!(asm.finish(), Err(Error::EmptyGrid)));
    }
}
