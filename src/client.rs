use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::capabilities::{
    CapabilitiesTable, CoverageSummary, HEIGHT_TITLE_MARKER, RunTime, format_run_time,
};
use crate::config::{ClientConfig, Credentials, load_config};
use crate::describe::CoverageDescription;
use crate::error::{Error, Result};
use crate::geo::BoundingBox;
use crate::grid::{Grid3D, GridAssembler, MissingSlicePolicy};
use crate::horizon::{missing_timestamps, required_timestamps};
use crate::products::{Area, Dataset, ServiceOption, find_service};
use crate::raster::Raster;
use crate::series::{NamedPoint, TimeSeries, interpolate_points};
use crate::token::{TOKEN_URL, Token, parse_token, token_request_url};
use crate::transport::{HttpTransport, Transport};
use crate::util::{append_query, iso_hour, redact_url};

/// The only WCS version the service speaks.
pub const WCS_VERSION: &str = "2.0.1";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared flag that aborts retries and run-time fallbacks when set.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The field and forecast cycle currently selected.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageSelection {
    pub title: String,
    pub run_time: DateTime<Utc>,
    pub coverage_id: String,
}

impl From<&CoverageSummary> for CoverageSelection {
    fn from(row: &CoverageSummary) -> Self {
        Self {
            title: row.title.clone(),
            run_time: row.run_time,
            coverage_id: row.coverage_id.clone(),
        }
    }
}

/// A WCS session: one product, one field, one run time, one area of interest.
///
/// Every request blocks. The session state is mutated through `&mut self`
/// and is not meant to be shared between callers.
pub struct Client {
    credentials: Option<Credentials>,
    token: Option<Token>,
    token_url: String,
    verify: bool,

    retry_max: usize,
    retry_sleep: Duration,
    progress: bool,
    missing_slices: MissingSlicePolicy,
    height_level: u32,
    cancel: Option<CancelFlag>,

    transport: Box<dyn Transport>,
    /// The transport is the built-in [`HttpTransport`] and may be rebuilt.
    http_transport: bool,

    product: Option<&'static ServiceOption>,
    base_url: Option<String>,
    capabilities: Option<CapabilitiesTable>,
    title: Option<String>,
    selection: Option<CoverageSelection>,
    description: Option<CoverageDescription>,
    requested_times: Vec<DateTime<Utc>>,
    bbox: Option<BoundingBox>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("has_token", &self.token.is_some())
            .field("retry_max", &self.retry_max)
            .field("retry_sleep", &self.retry_sleep)
            .field("missing_slices", &self.missing_slices)
            .field("product", &self.product)
            .field("selection", &self.selection)
            .field("bbox", &self.bbox)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client from environment variables and/or a credentials file.
    ///
    /// This is equivalent to `Client::new(None, None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::new(None, None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit `username`/`password`/`token` arguments
    /// - environment variables `METEOFR_USERNAME` / `METEOFR_PASSWORD` / `METEOFR_TOKEN`
    /// - a JSON credentials file (`METEOFR_CREDENTIALS` or `meteofr_credentials.json`)
    pub fn new(
        username: Option<String>,
        password: Option<String>,
        token: Option<String>,
    ) -> Result<Self> {
        let cfg = load_config(username, password, token, None)?;
        Self::with_config(cfg)
    }

    pub fn with_config(cfg: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(DEFAULT_TIMEOUT, cfg.verify)?;
        let mut client = Self::with_transport(cfg, Box::new(transport))?;
        client.http_transport = true;
        Ok(client)
    }

    /// Creates a client over any [`Transport`].
    pub fn with_transport(cfg: ClientConfig, transport: Box<dyn Transport>) -> Result<Self> {
        let token = cfg.token.map(Token::new).transpose()?;
        Ok(Self {
            credentials: cfg.credentials,
            token,
            token_url: TOKEN_URL.to_string(),
            verify: cfg.verify,
            retry_max: 5,
            retry_sleep: Duration::from_secs(5),
            progress: false,
            missing_slices: MissingSlicePolicy::default(),
            height_level: 2,
            cancel: None,
            transport,
            http_transport: false,
            product: None,
            base_url: None,
            capabilities: None,
            title: None,
            selection: None,
            description: None,
            requested_times: Vec::new(),
            bbox: None,
        })
    }

    /// Rebuilds the built-in HTTP transport with `timeout`.
    ///
    /// A transport given to [`Client::with_transport`] is kept as is.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        if !self.http_transport {
            warn!("custom transport in use, timeout ignored");
            return Ok(self);
        }
        self.transport = Box::new(HttpTransport::new(timeout, self.verify)?);
        Ok(self)
    }

    /// Trials per request, including the first one.
    pub fn with_retry_max(mut self, retry_max: usize) -> Self {
        self.retry_max = retry_max.max(1);
        self
    }

    /// Fixed pause between two trials.
    pub fn with_retry_sleep(mut self, retry_sleep: Duration) -> Self {
        self.retry_sleep = retry_sleep;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_missing_slices(mut self, policy: MissingSlicePolicy) -> Self {
        self.missing_slices = policy;
        self
    }

    /// Height in metres used for "at specified height level above ground" fields.
    pub fn with_height_level(mut self, height: u32) -> Self {
        self.height_level = height;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    pub fn set_token(&mut self, token: Token) {
        self.token = Some(token);
    }

    /// Exchanges credentials for an API key with a single `GetAPIKey` call.
    ///
    /// On failure the previously held token, if any, is left untouched.
    pub fn fetch_token(&mut self, credentials: Option<&Credentials>) -> Result<&Token> {
        let credentials = credentials
            .or(self.credentials.as_ref())
            .ok_or_else(|| {
                Error::Authentication("both username and password should be given".into())
            })?;
        let url = token_request_url(&self.token_url, credentials)?;
        info!("GetAPIKey request");
        let body = self.transport.get(&url)?;
        let token = parse_token(&String::from_utf8_lossy(&body))?;
        Ok(self.token.insert(token))
    }

    /// Returns the held token, fetching one from the configured credentials if needed.
    pub fn ensure_token(&mut self) -> Result<&Token> {
        if self.token.is_none() {
            if self.credentials.is_none() {
                return Err(Error::Authentication(
                    "no API token and no credentials to fetch one".into(),
                ));
            }
            self.fetch_token(None)?;
        }
        self.token
            .as_ref()
            .ok_or_else(|| Error::Authentication("no API token".into()))
    }

    /// Selects a forecast product and loads its capabilities.
    pub fn select_product(
        &mut self,
        dataset: Dataset,
        area: Area,
        accuracy: Option<f64>,
    ) -> Result<()> {
        let option = find_service(dataset, area, accuracy)?;
        let base_url = option.base_url(self.ensure_token()?);
        info!(%dataset, %area, accuracy = option.accuracy, "selected product");

        self.product = Some(option);
        self.base_url = Some(base_url);
        self.capabilities = None;
        self.title = None;
        self.selection = None;
        self.description = None;
        self.requested_times.clear();
        self.bbox = None;
        self.update()
    }

    pub fn product(&self) -> Option<&'static ServiceOption> {
        self.product
    }

    /// Refreshes the capabilities, e.g. to see a newer run time.
    pub fn update(&mut self) -> Result<()> {
        let base = self.base_url()?.to_string();
        let url = append_query(
            &base,
            &[
                ("SERVICE", "WCS"),
                ("REQUEST", "GetCapabilities"),
                ("version", WCS_VERSION),
                ("Language", "eng"),
            ],
        );
        info!("GetCapabilities request");
        let table = self.with_retries("GetCapabilities", || {
            let body = self.transport.get(&url)?;
            CapabilitiesTable::parse(&String::from_utf8_lossy(&body))
        })?;
        if table.is_empty() {
            warn!("capabilities list no hourly coverage");
        }
        debug!(rows = table.rows().len(), "capabilities loaded");
        self.capabilities = Some(table);
        Ok(())
    }

    pub fn capabilities(&self) -> Result<&CapabilitiesTable> {
        self.capabilities
            .as_ref()
            .ok_or(Error::NotReady("no capabilities loaded: call select_product first"))
    }

    /// Fields available on a 1-hour frequency, sorted.
    pub fn list_titles(&self) -> Result<Vec<String>> {
        Ok(self.capabilities()?.titles())
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        if !self.capabilities()?.contains_title(title) {
            return Err(Error::InvalidSelection(format!("title '{}' not found", title)));
        }
        self.title = Some(title.to_string());
        Ok(())
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Whether the selected coverage needs a height subset.
    pub fn title_with_height(&self) -> bool {
        self.selection
            .as_ref()
            .is_some_and(|s| s.title.contains(HEIGHT_TITLE_MARKER))
    }

    /// Run times of `title` (or of the selected title), oldest first, as `YYYY-MM-DDTHH`.
    pub fn list_available_run_times(&mut self, title: Option<&str>) -> Result<Vec<String>> {
        if let Some(title) = title {
            self.set_title(title)?;
        }
        let title = self
            .title
            .as_deref()
            .ok_or(Error::NotReady("no title selected: call set_title first"))?;
        Ok(self
            .capabilities()?
            .run_times(title)
            .iter()
            .map(format_run_time)
            .collect())
    }

    /// Resolves `title` + `run_time` into a coverage id and makes it current.
    pub fn select_coverage_id(
        &mut self,
        title: &str,
        run_time: RunTime,
    ) -> Result<&CoverageSelection> {
        self.set_title(title)?;
        let selection = CoverageSelection::from(self.capabilities()?.resolve(title, run_time)?);
        info!(coverage_id = %selection.coverage_id, "selected coverage");
        self.description = None;
        self.requested_times.clear();
        Ok(self.selection.insert(selection))
    }

    pub fn selection(&self) -> Option<&CoverageSelection> {
        self.selection.as_ref()
    }

    /// Fetches the spatial and temporal extent of the selected coverage.
    pub fn describe(&mut self) -> Result<&CoverageDescription> {
        let base = self.base_url()?.to_string();
        let coverage_id = self
            .selection
            .as_ref()
            .map(|s| s.coverage_id.clone())
            .ok_or(Error::NotReady("no coverage selected: call select_coverage_id first"))?;
        let url = append_query(
            &base,
            &[
                ("SERVICE", "WCS"),
                ("version", WCS_VERSION),
                ("REQUEST", "DescribeCoverage"),
                ("CoverageId", &coverage_id),
            ],
        );
        info!(%coverage_id, "DescribeCoverage request");
        let description = self.with_retries("DescribeCoverage", || {
            let body = self.transport.get(&url)?;
            CoverageDescription::parse(&coverage_id, &String::from_utf8_lossy(&body))
        })?;
        Ok(self.description.insert(description))
    }

    pub fn description(&self) -> Option<&CoverageDescription> {
        self.description.as_ref()
    }

    /// Keeps the latest run time whose forecast covers the next `horizon` hours,
    /// stepping back through older run times as needed.
    pub fn set_complete_run_time(&mut self, horizon: usize) -> Result<&CoverageSelection> {
        self.set_complete_run_time_at(Utc::now(), horizon)
    }

    /// Same as [`Client::set_complete_run_time`] with an explicit "now".
    pub fn set_complete_run_time_at(
        &mut self,
        now: DateTime<Utc>,
        horizon: usize,
    ) -> Result<&CoverageSelection> {
        let selection = self
            .selection
            .clone()
            .ok_or(Error::NotReady("no coverage selected: call select_coverage_id first"))?;
        let run_times = self.capabilities()?.run_times(&selection.title);
        let mut idx = run_times
            .iter()
            .position(|t| *t == selection.run_time)
            .ok_or_else(|| {
                Error::InvalidSelection(format!(
                    "run time {} is no longer listed: call update()",
                    format_run_time(&selection.run_time)
                ))
            })?;

        let required = required_timestamps(now, horizon);
        loop {
            let available = self.describe()?.hourly_timestamps();
            let missing = missing_timestamps(&required, &available);
            if missing.is_empty() {
                info!(
                    run_time = %format_run_time(&run_times[idx]),
                    horizon,
                    "run time covers the horizon"
                );
                self.requested_times = required;
                return self
                    .selection
                    .as_ref()
                    .ok_or(Error::NotReady("no coverage selected"));
            }

            self.check_cancelled()?;
            if idx == 0 {
                return Err(Error::HorizonUnavailable {
                    title: selection.title,
                    horizon,
                });
            }
            idx -= 1;
            warn!(
                missing = missing.len(),
                run_time = %format_run_time(&run_times[idx]),
                "horizon not covered, switching to previous run time"
            );
            self.select_coverage_id(&selection.title, RunTime::At(run_times[idx]))?;
        }
    }

    /// Timestamps `create_3d_array` will fetch.
    pub fn requested_times(&self) -> Vec<DateTime<Utc>> {
        if !self.requested_times.is_empty() {
            return self.requested_times.clone();
        }
        self.description
            .as_ref()
            .map(|d| d.hourly_timestamps())
            .unwrap_or_default()
    }

    /// Restricts the fetch to explicit timestamps.
    pub fn set_requested_times(&mut self, times: Vec<DateTime<Utc>>) {
        self.requested_times = times;
    }

    /// Sets the area to download; it must lie inside the coverage's extent.
    pub fn set_bbox_of_interest(
        &mut self,
        lon_min: f64,
        lat_min: f64,
        lon_max: f64,
        lat_max: f64,
    ) -> Result<BoundingBox> {
        let bbox = BoundingBox::new(lon_min, lat_min, lon_max, lat_max)?;
        let description = self
            .description
            .as_ref()
            .ok_or(Error::NotReady("no coverage description: call describe first"))?;
        bbox.check_within(&description.max_bbox)?;
        self.bbox = Some(bbox);
        Ok(bbox)
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        self.bbox
    }

    /// GetCoverage URL of the selected coverage at `time`.
    pub fn coverage_url(&self, time: &DateTime<Utc>) -> Result<String> {
        let base = self.base_url()?;
        let selection = self
            .selection
            .as_ref()
            .ok_or(Error::NotReady("no coverage selected: call select_coverage_id first"))?;
        let bbox = self
            .bbox
            .ok_or(Error::NotReady("no bounding box: call set_bbox_of_interest first"))?;

        let time_subset = format!("time({})", iso_hour(time));
        let lat_subset = format!("lat({},{})", bbox.lat_min, bbox.lat_max);
        let lon_subset = format!("long({},{})", bbox.lon_min, bbox.lon_max);
        let height_subset = format!("height({})", self.height_level);

        let mut params = vec![
            ("SERVICE", "WCS"),
            ("VERSION", WCS_VERSION),
            ("REQUEST", "GetCoverage"),
            ("format", "image/tiff"),
            ("coverageId", selection.coverage_id.as_str()),
            ("subset", time_subset.as_str()),
            ("subset", lat_subset.as_str()),
            ("subset", lon_subset.as_str()),
        ];
        if self.title_with_height() {
            params.push(("subset", height_subset.as_str()));
        }
        Ok(append_query(base, &params))
    }

    /// Downloads one raster per requested timestamp and stacks them.
    ///
    /// Each timestamp gets `retry_max` trials; what happens once they are spent
    /// depends on the [`MissingSlicePolicy`].
    pub fn create_3d_array(&self) -> Result<Grid3D> {
        let times = self.requested_times();
        if times.is_empty() {
            return Err(Error::NotReady(
                "no timestamps to fetch: call describe or set_complete_run_time first",
            ));
        }

        let pb = if self.progress {
            let pb = ProgressBar::new(times.len() as u64);
            let template = "{spinner:.green} {pos}/{len} {wide_bar} {eta} {msg}";
            if let Ok(style) = ProgressStyle::with_template(template) {
                pb.set_style(style.progress_chars("=>-"));
            }
            Some(pb)
        } else {
            None
        };

        info!(count = times.len(), "GetCoverage requests");
        let mut assembler = GridAssembler::new(self.missing_slices);
        for time in &times {
            let url = self.coverage_url(time)?;
            if let Some(pb) = &pb {
                pb.set_message(iso_hour(time));
            }
            let what = format!("GetCoverage {}", iso_hour(time));
            match self.with_retries(&what, || Raster::decode(&self.transport.get(&url)?)) {
                Ok(raster) => assembler.push(*time, raster)?,
                Err(e @ Error::RetriesExhausted { .. }) => {
                    warn!(time = %iso_hour(time), error = %e, "raster unavailable");
                    assembler.push_missing(*time, e)?;
                }
                Err(e) => return Err(e),
            }
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }
        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }

        let grid = assembler.finish()?;
        if !grid.gaps().is_empty() {
            warn!(gaps = grid.gaps().len(), "grid assembled with missing slices");
        }
        Ok(grid)
    }

    /// Interpolated series at `points`, which must lie inside the grid.
    pub fn create_time_series(&self, grid: &Grid3D, points: &[NamedPoint]) -> Result<TimeSeries> {
        interpolate_points(grid, points)
    }

    fn base_url(&self) -> Result<&str> {
        self.base_url
            .as_deref()
            .ok_or(Error::NotReady("no product selected: call select_product first"))
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.is_cancelled() => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    /// Runs `f` up to `retry_max` times with a fixed pause while it fails with a
    /// retryable error.
    fn with_retries<T, F>(&self, what: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut trials = 0usize;
        loop {
            self.check_cancelled()?;
            trials += 1;
            match f() {
                Ok(v) => return Ok(v),
                Err(err) if err.is_retryable() => {
                    if trials >= self.retry_max {
                        return Err(Error::RetriesExhausted {
                            what: redact_url(what),
                            trials,
                            last: Box::new(err),
                        });
                    }
                    warn!(what, trial = trials, error = %err, "retrying");
                    thread::sleep(self.retry_sleep);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
