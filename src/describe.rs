//! DescribeCoverage parsing.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::geo::BoundingBox;
use crate::util::{hourly_range, parse_iso_z};
use crate::xml::{ensure_not_exception, parse_document};

/// Spatial and temporal extent of one coverage.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageDescription {
    pub coverage_id: String,
    /// Largest box a GetCoverage request may ask for.
    pub max_bbox: BoundingBox,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub axis_labels: Vec<String>,
    pub uom_labels: Vec<String>,
    pub srs_dimension: Option<u32>,
}

impl CoverageDescription {
    pub fn parse(coverage_id: &str, xml: &str) -> Result<Self> {
        let doc = parse_document(xml)?;
        ensure_not_exception(&doc)?;

        let envelope = doc
            .path(&["CoverageDescription", "boundedBy", "EnvelopeWithTimePeriod"])
            .ok_or_else(|| {
                Error::IncompleteDocument(format!(
                    "description of {} has no boundedBy/EnvelopeWithTimePeriod",
                    coverage_id
                ))
            })?;

        let labels = |name: &str| -> Vec<String> {
            envelope
                .attr(name)
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default()
        };
        let axis_labels = labels("axisLabels");
        let uom_labels = labels("uomLabels");
        let srs_dimension = envelope.attr("srsDimension").and_then(|s| s.trim().parse().ok());

        let lat_first = axis_labels
            .first()
            .is_some_and(|l| l.to_lowercase().starts_with("lat"));
        let lower = corner(envelope.child_text("lowerCorner"), "lowerCorner", lat_first)?;
        let upper = corner(envelope.child_text("upperCorner"), "upperCorner", lat_first)?;
        let max_bbox = BoundingBox::new(lower.0, lower.1, upper.0, upper.1)?;

        let begin = position(envelope.child_text("beginPosition"), "beginPosition")?;
        let end = position(envelope.child_text("endPosition"), "endPosition")?;
        if end < begin {
            return Err(Error::Xml(format!(
                "description of {} ends before it begins",
                coverage_id
            )));
        }

        Ok(Self {
            coverage_id: coverage_id.to_string(),
            max_bbox,
            begin,
            end,
            axis_labels,
            uom_labels,
            srs_dimension,
        })
    }

    /// The coverage's native one-hour time axis, `begin..=end`.
    pub fn hourly_timestamps(&self) -> Vec<DateTime<Utc>> {
        hourly_range(self.begin, self.end)
    }
}

/// Returns `(lon, lat)` from a `"a b [c]"` corner.
fn corner(text: Option<&str>, name: &str, lat_first: bool) -> Result<(f64, f64)> {
    let text = text.ok_or_else(|| Error::Xml(format!("missing {}", name)))?;
    let values = text
        .split_whitespace()
        .take(2)
        .map(str::parse::<f64>)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Xml(format!("{} '{}': {}", name, text, e)))?;
    match values.as_slice() {
        [a, b] if lat_first => Ok((*b, *a)),
        [a, b] => Ok((*a, *b)),
        _ => Err(Error::Xml(format!("{} '{}' needs two coordinates", name, text))),
    }
}

fn position(text: Option<&str>, name: &str) -> Result<DateTime<Utc>> {
    let text = text.ok_or_else(|| Error::Xml(format!("missing {}", name)))?;
    parse_iso_z(text).ok_or_else(|| {
        Error::Xml(format!("{} '{}' is not YYYY-MM-DDTHH:MM:SSZ", name, text))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn description_xml(axis_labels: &str, lower: &str, upper: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<wcs:CoverageDescriptions xmlns:wcs="http://www.opengis.net/wcs/2.0" xmlns:gml="http://www.opengis.net/gml/3.2">
  <wcs:CoverageDescription gml:id="T___2020-03-24T06.00.00Z">
    <gml:boundedBy>
      <gml:EnvelopeWithTimePeriod srsName="http://www.opengis.net/def/crs/EPSG/0/4326" axisLabels="{}" uomLabels="deg deg s" srsDimension="3">
        <gml:lowerCorner>{}</gml:lowerCorner>
        <gml:upperCorner>{}</gml:upperCorner>
        <gml:beginPosition frame="ISO-8601">2020-03-24T07:00:00Z</gml:beginPosition>
        <gml:endPosition frame="ISO-8601">2020-03-26T06:00:00Z</gml:endPosition>
      </gml:EnvelopeWithTimePeriod>
    </gml:boundedBy>
  </wcs:CoverageDescription>
</wcs:CoverageDescriptions>"#,
            axis_labels, lower, upper
        )
    }

    #[test]
    fn reads_extent_and_time_axis() {
        let xml = description_xml("long lat time", "-12 37.5", "16 55.4");
        let d = CoverageDescription::parse("T___2020-03-24T06.00.00Z", &xml).unwrap();
        assert_eq!(d.max_bbox, BoundingBox::new(-12.0, 37.5, 16.0, 55.4).unwrap());
        assert_eq!(d.srs_dimension, Some(3));
        assert_eq!(d.axis_labels, vec!["long", "lat", "time"]);

        let hours = d.hourly_timestamps();
        assert_eq!(hours.len(), 48);
        assert_eq!(hours[0], Utc.with_ymd_and_hms(2020, 3, 24, 7, 0, 0).unwrap());
        assert_eq!(hours[47], Utc.with_ymd_and_hms(2020, 3, 26, 6, 0, 0).unwrap());
    }

    #[test]
    fn latitude_first_axes_are_swapped() {
        let xml = description_xml("lat long time", "37.5 -12 0", "55.4 16 0");
        let d = CoverageDescription::parse("T", &xml).unwrap();
        assert_eq!(d.max_bbox, BoundingBox::new(-12.0, 37.5, 16.0, 55.4).unwrap());
    }

    #[test]
    fn missing_envelope_is_reported() {
        let xml = r#"<wcs:CoverageDescriptions xmlns:wcs="http://www.opengis.net/wcs/2.0"/>"#;
        assert!(matches!(
            CoverageDescription::parse("T", xml),
            Err(Error::IncompleteDocument(_))
        ));
        let xml = description_xml("long lat time", "-12", "16 55.4");
        assert!(matches!(CoverageDescription::parse("T", &xml), Err(Error::Xml(_))));
    }
}
