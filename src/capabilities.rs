//! GetCapabilities parsing and coverage identifier resolution.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::{Error, Result};
use crate::xml::{ensure_not_exception, parse_document};

/// Titles carrying this phrase need a `height` subset in GetCoverage.
pub const HEIGHT_TITLE_MARKER: &str = "at specified height level above ground";

const RUN_TIME_SEPARATOR: &str = "___";

/// One coverage advertised by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageSummary {
    pub title: String,
    pub coverage_id: String,
    pub run_time: DateTime<Utc>,
}

/// Forecast cycle requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTime {
    Latest,
    At(DateTime<Utc>),
}

/// Hourly-frequency coverages of one product.
#[derive(Debug, Clone, Default)]
pub struct CapabilitiesTable {
    rows: Vec<CoverageSummary>,
}

impl CapabilitiesTable {
    pub fn from_rows(rows: Vec<CoverageSummary>) -> Self {
        Self { rows }
    }

    /// Parses a `wcs:Capabilities` document, keeping the 1-hour coverages only.
    ///
    /// A well-formed document without `Contents/CoverageSummary` is reported as
    /// [`Error::IncompleteDocument`]: the service publishes those while a run is
    /// still being loaded.
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = parse_document(xml)?;
        ensure_not_exception(&doc)?;

        let contents = doc
            .child("Contents")
            .ok_or_else(|| Error::IncompleteDocument("capabilities without Contents".into()))?;
        let mut summaries = contents.children_named("CoverageSummary").peekable();
        if summaries.peek().is_none() {
            return Err(Error::IncompleteDocument(
                "capabilities without CoverageSummary".into(),
            ));
        }

        let mut rows = Vec::new();
        for summary in summaries {
            let (Some(coverage_id), Some(title)) =
                (summary.child_text("CoverageId"), summary.child_text("Title"))
            else {
                warn!("skipping CoverageSummary without CoverageId/Title");
                continue;
            };

            let Some((run_time, suffix)) = split_coverage_id(coverage_id) else {
                warn!(coverage_id, "skipping coverage with unparsable run time");
                continue;
            };
            if !suffix.is_empty() {
                continue;
            }

            rows.push(CoverageSummary {
                title: title.to_string(),
                coverage_id: coverage_id.to_string(),
                run_time,
            });
        }

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[CoverageSummary] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sorted, de-duplicated titles.
    pub fn titles(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| r.title.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn contains_title(&self, title: &str) -> bool {
        self.rows.iter().any(|r| r.title == title)
    }

    /// Distinct run times of `title`, oldest first.
    pub fn run_times(&self, title: &str) -> Vec<DateTime<Utc>> {
        self.rows
            .iter()
            .filter(|r| r.title == title)
            .map(|r| r.run_time)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn resolve(&self, title: &str, run_time: RunTime) -> Result<&CoverageSummary> {
        if !self.contains_title(title) {
            return Err(Error::InvalidSelection(format!("title '{}' not found", title)));
        }
        match run_time {
            RunTime::Latest => self
                .rows
                .iter()
                .filter(|r| r.title == title)
                .max_by_key(|r| r.run_time)
                .ok_or_else(|| Error::InvalidSelection(format!("title '{}' not found", title))),
            RunTime::At(t) => self
                .rows
                .iter()
                .find(|r| r.title == title && r.run_time == t)
                .ok_or_else(|| {
                    Error::InvalidSelection(format!(
                        "run time {} not found in available run times of '{}'",
                        format_run_time(&t),
                        title
                    ))
                }),
        }
    }
}

/// Splits `FIELD___2020-03-24T06.00.00Z[suffix]` into the run time and the suffix.
fn split_coverage_id(coverage_id: &str) -> Option<(DateTime<Utc>, &str)> {
    let tail = coverage_id.rsplit(RUN_TIME_SEPARATOR).next()?;
    let (stamp, suffix) = tail.split_once('Z')?;
    let run_time = NaiveDateTime::parse_from_str(stamp.trim(), "%Y-%m-%dT%H.%M.%S")
        .ok()?
        .and_utc();
    Some((run_time, suffix.trim()))
}

/// `YYYY-MM-DDTHH`, as listed by [`crate::Client::list_available_run_times`].
pub fn format_run_time(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H").to_string()
}

impl fmt::Display for RunTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunTime::Latest => f.write_str("latest"),
            RunTime::At(t) => f.write_str(&format_run_time(t)),
        }
    }
}

impl FromStr for RunTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(RunTime::Latest);
        }
        let parsed = NaiveDateTime::parse_from_str(&format!("{}:00:00", s), "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ"))
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H.%M.%SZ"))
            .map_err(|_| {
                Error::InvalidSelection(format!(
                    "run time '{}' is neither 'latest' nor YYYY-MM-DDTHH",
                    s
                ))
            })?;
        Ok(RunTime::At(parsed.and_utc()))
    }
}
