use serde::Serialize;

use crate::error::{Error, Result};

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub lon_min: f64,
    pub lat_min: f64,
    pub lon_max: f64,
    pub lat_max: f64,
}

impl BoundingBox {
    /// Creates a box, checking that min < max on both axes.
    pub fn new(lon_min: f64, lat_min: f64, lon_max: f64, lat_max: f64) -> Result<Self> {
        let all_finite = [lon_min, lat_min, lon_max, lat_max]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite || lon_min >= lon_max || lat_min >= lat_max {
            return Err(Error::InvalidBoundingBox(format!(
                "min coord ({}, {}) should be smaller than max ({}, {})",
                lon_min, lat_min, lon_max, lat_max
            )));
        }
        Ok(Self {
            lon_min,
            lat_min,
            lon_max,
            lat_max,
        })
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.lon_min && lon <= self.lon_max && lat >= self.lat_min && lat <= self.lat_max
    }

    /// Fails unless both corners of `self` lie inside `domain`.
    pub fn check_within(&self, domain: &BoundingBox) -> Result<()> {
        for (lon, lat) in [(self.lon_min, self.lat_min), (self.lon_max, self.lat_max)] {
            if !domain.contains(lon, lat) {
                return Err(Error::OutsideDomain(format!(
                    "point ({}, {}) is outside the model domain {}",
                    lon, lat, domain
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn approx_eq(&self, other: &BoundingBox, tolerance: f64) -> bool {
        (self.lon_min - other.lon_min).abs() <= tolerance
            && (self.lat_min - other.lat_min).abs() <= tolerance
            && (self.lon_max - other.lon_max).abs() <= tolerance
            && (self.lat_max - other.lat_max).abs() <= tolerance
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.lon_min, self.lat_min, self.lon_max, self.lat_max
        )
    }
}

impl std::str::FromStr for BoundingBox {
    type Err = Error;

    /// Parses `lon_min,lat_min,lon_max,lat_max`.
    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidBoundingBox(format!("'{}': {}", s, e)))?;
        match values.as_slice() {
            [a, b, c, d] => BoundingBox::new(*a, *b, *c, *d),
            _ => Err(Error::InvalidBoundingBox(format!(
                "'{}' should have 4 comma-separated values",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn france() -> BoundingBox {
        BoundingBox::new(-12.0, 37.5, 16.0, 55.4).unwrap()
    }

    #[test]
    fn rejects_inverted_or_flat_boxes() {
        assert!(matches!(
            BoundingBox::new(2.0, 45.0, 1.0, 46.0),
            Err(Error::InvalidBoundingBox(_))
        ));
        assert!(matches!(
            BoundingBox::new(1.0, 46.0, 2.0, 46.0),
            Err(Error::InvalidBoundingBox(_))
        ));
        assert!(BoundingBox::new(1.0, f64::NAN, 2.0, 46.0).is_err());
    }

    #[test]
    fn corners_must_be_in_domain() {
        let inside = BoundingBox::new(1.0, 43.0, 3.0, 45.0).unwrap();
        assert!(inside.check_within(&france()).is_ok());

        let west = BoundingBox::new(-13.0, 43.0, 3.0, 45.0).unwrap();
        assert!(matches!(
            west.check_within(&france()),
            Err(Error::OutsideDomain(_))
        ));
        let north = BoundingBox::new(1.0, 43.0, 3.0, 56.0).unwrap();
        assert!(north.check_within(&france()).is_err());
        assert!(france().check_within(&france()).is_ok());
    }

    #[test]
    fn parses_comma_separated() {
        let bbox: BoundingBox = "1.5, 43, 3,45.25".parse().unwrap();
        assert_eq!(bbox, BoundingBox::new(1.5, 43.0, 3.0, 45.25).unwrap());
        assert!("1,2,3".parse::<BoundingBox>().is_err());
        assert!("3,2,1,0".parse::<BoundingBox>().is_err());
    }
}
