//! Point time series extracted from a [`Grid3D`] by bilinear interpolation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::grid::Grid3D;

/// Fractional indices closer than this to a node snap onto it.
const NODE_SNAP: f64 = 1e-9;

/// A named location of interest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedPoint {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
}

impl NamedPoint {
    pub fn new(name: impl Into<String>, lon: f64, lat: f64) -> Self {
        Self {
            name: name.into(),
            lon,
            lat,
        }
    }
}

impl FromStr for NamedPoint {
    type Err = Error;

    /// Parses `name:lon:lat`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.rsplitn(3, ':').collect();
        let bad =
            || Error::InvalidSelection(format!("point '{}' should look like name:lon:lat", s));
        match parts.as_slice() {
            [lat, lon, name] if !name.trim().is_empty() => Ok(NamedPoint::new(
                name.trim(),
                lon.trim().parse().map_err(|_| bad())?,
                lat.trim().parse().map_err(|_| bad())?,
            )),
            _ => Err(bad()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointSeries {
    pub point: NamedPoint,
    pub values: Vec<(DateTime<Utc>, f32)>,
}

/// Interpolated series for each requested point, in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeSeries {
    pub series: Vec<PointSeries>,
}

impl TimeSeries {
    pub fn get(&self, name: &str) -> Option<&PointSeries> {
        self.series.iter().find(|s| s.point.name == name)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Interpolates every time slice of `grid` at each point.
///
/// Points must fall between the outermost pixel centres; extrapolation is
/// refused with [`Error::OutsideDomain`].
pub fn interpolate_points(grid: &Grid3D, points: &[NamedPoint]) -> Result<TimeSeries> {
    let mut series = Vec::with_capacity(points.len());
    for point in points {
        let (fx, fy) = fractional_index(grid, point)?;
        let values = (0..grid.times().len())
            .map(|t| (grid.times()[t], bilinear(grid, fx, fy, t)))
            .collect();
        series.push(PointSeries {
            point: point.clone(),
            values,
        });
    }
    Ok(TimeSeries { series })
}

fn fractional_index(grid: &Grid3D, point: &NamedPoint) -> Result<(f64, f64)> {
    let (dx, dy) = grid.resolution();
    let lons = grid.lons();
    let lats = grid.lats();
    let (west, east) = (lons[0], lons[lons.len() - 1]);
    let (north, south) = (lats[0], lats[lats.len() - 1]);

    let fx = snap((point.lon - west) / dx);
    let fy = snap((north - point.lat) / dy);
    let max_x = (grid.width() - 1) as f64;
    let max_y = (grid.height() - 1) as f64;
    if !(0.0..=max_x).contains(&fx) || !(0.0..=max_y).contains(&fy) {
        return Err(Error::OutsideDomain(format!(
            "point '{}' ({}, {}) is outside the grid nodes lon [{}, {}] lat [{}, {}]",
            point.name, point.lon, point.lat, west, east, south, north
        )));
    }
    Ok((fx, fy))
}

fn snap(f: f64) -> f64 {
    let r = f.round();
    if (f - r).abs() < NODE_SNAP { r } else { f }
}

fn bilinear(grid: &Grid3D, fx: f64, fy: f64, t: usize) -> f32 {
    let x1 = fx.floor() as usize;
    let y1 = fy.floor() as usize;
    let x2 = (x1 + 1).min(grid.width() - 1);
    let y2 = (y1 + 1).min(grid.height() - 1);
    let dx = fx - x1 as f64;
    let dy = fy - y1 as f64;

    let corners = [
        (y1, x1, (1.0 - dx) * (1.0 - dy)),
        (y1, x2, dx * (1.0 - dy)),
        (y2, x1, (1.0 - dx) * dy),
        (y2, x2, dx * dy),
    ];
    // Zero-weight corners are skipped so a NaN neighbour cannot spoil a node value.
    corners
        .iter()
        .filter(|(_, _, w)| *w > 0.0)
        .map(|&(y, x, w)| grid.get(y, x, t).map_or(f64::NAN, f64::from) * w)
        .sum::<f64>() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::BoundingBox;
    use crate::grid::{GridAssembler, MissingSlicePolicy};
    use crate::raster::Raster;
    use chrono::{Duration, TimeZone};

    /// 3x3 grid over lon [0, 3], lat [40, 43]; nodes at .5 degrees.
    fn grid() -> Grid3D {
        let bounds = BoundingBox::new(0.0, 40.0, 3.0, 43.0).unwrap();
        let t0 = Utc.with_ymd_and_hms(2020, 3, 24, 7, 0, 0).unwrap();
        let mut asm = GridAssembler::new(MissingSlicePolicy::Fail);
        for k in 0..2 {
            let data = (0..9).map(|i| (i * 10 + k) as f32).collect();
            asm.push(t0 + Duration::hours(k as i64), Raster::new(3, 3, bounds, data).unwrap())
                .unwrap();
        }
        asm.finish().unwrap()
    }

    #[test]
    fn node_values_are_returned_exactly() {
        let g = grid();
        let points: Vec<_> = (0..3)
            .flat_map(|r| (0..3).map(move |c| (r, c)))
            .map(|(r, c)| NamedPoint::new(format!("n{r}{c}"), g.lons()[c], g.lats()[r]))
            .collect();
        let ts = interpolate_points(&g, &points).unwrap();
        for (r, c) in (0..3).flat_map(|r| (0..3).map(move |c| (r, c))) {
            let s = ts.get(&format!("n{r}{c}")).unwrap();
            for (t, (_, v)) in s.values.iter().enumerate() {
                assert_eq!(*v, g.get(r, c, t).unwrap());
            }
        }
    }

    #[test]
    fn midpoint_is_the_average() {
        let g = grid();
        // Halfway between nodes (0,0)=0, (0,1)=10, (1,0)=30, (1,1)=40.
        let ts = interpolate_points(&g, &[NamedPoint::new("mid", 1.0, 42.0)]).unwrap();
        let values = &ts.get("mid").unwrap().values;
        assert_eq!(values.len(), 2);
        assert!((values[0].1 - 20.0).abs() < 1e-5);
        assert!((values[1].1 - 21.0).abs() < 1e-5);
    }

    #[test]
    fn extrapolation_is_refused() {
        let g = grid();
        // Inside the raster bounds but west of the first pixel centre.
        let err = interpolate_points(&g, &[NamedPoint::new("edge", 0.2, 41.5)]).unwrap_err();
        assert!(matches!(err, Error::OutsideDomain(_)));
        assert!(interpolate_points(&g, &[NamedPoint::new("far", 10.0, 41.5)]).is_err());
    }

    #[test]
    fn nan_neighbour_does_not_leak_into_node() {
        let bounds = BoundingBox::new(0.0, 0.0, 2.0, 1.0).unwrap();
        let t0 = Utc.with_ymd_and_hms(2020, 3, 24, 7, 0, 0).unwrap();
        let mut asm = GridAssembler::new(MissingSlicePolicy::Fail);
        asm.push(t0, Raster::new(2, 1, bounds, vec![5.0, f32::NAN]).unwrap())
            .unwrap();
        let g = asm.finish().unwrap();
        let ts = interpolate_points(&g, &[NamedPoint::new("a", 0.5, 0.5)]).unwrap();
        assert_eq!(ts.series[0].values[0].1, 5.0);
    }

    #[test]
    fn parses_named_points() {
        let p: NamedPoint = "Toulouse:1.44:43.6".parse().unwrap();
        assert_eq!(p, NamedPoint::new("Toulouse", 1.44, 43.6));
        assert!("1.44:43.6".parse::<NamedPoint>().is_err());
        assert!("x:a:b".parse::<NamedPoint>().is_err());
    }
}
