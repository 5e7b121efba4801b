//! A small Rust client for the Météo-France Web Coverage Service (WCS 2.0.1).
//!
//! The flow follows the service's own sequence of requests:
//! obtain an API key, pick a forecast product, resolve a coverage (field + run
//! time), check that it covers the wanted look-ahead, then download one raster
//! per hour and stack them into a [`Grid3D`].
//!
//! ## Quick start
//! - Configure authentication via environment variables (`METEOFR_USERNAME`,
//!   `METEOFR_PASSWORD` or `METEOFR_TOKEN`) or a `meteofr_credentials.json` file
//!   holding `{"username": ..., "password": ...}`.
//! - Select a product and a field, then call [`Client::create_3d_array`].
//!
//! ```no_run
//! use meteofr_wcs::{Area, Client, Dataset, NamedPoint, RunTime};
//!
//! fn main() -> meteofr_wcs::Result<()> {
//!     let mut client = Client::from_env()?;
//!     client.select_product(Dataset::Arome, Area::France, Some(0.01))?;
//!     client.select_coverage_id(
//!         "Temperature at specified height level above ground",
//!         RunTime::Latest,
//!     )?;
//!     client.set_complete_run_time(24)?;
//!     client.set_bbox_of_interest(1.0, 43.0, 2.0, 44.0)?;
//!
//!     let grid = client.create_3d_array()?;
//!     let series = client.create_time_series(&grid, &[NamedPoint::new("Toulouse", 1.44, 43.6)])?;
//!     println!("{:?}", series.get("Toulouse"));
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod capabilities;
mod client;
mod config;
mod describe;
mod error;
mod geo;
mod grid;
mod horizon;
mod products;
mod raster;
pub mod render;
mod series;
mod token;
mod transport;
mod util;
mod xml;

pub use capabilities::{CapabilitiesTable, CoverageSummary, RunTime, format_run_time};
pub use client::{CancelFlag, Client, CoverageSelection, WCS_VERSION};
pub use config::{ClientConfig, Credentials, load_config};
pub use describe::CoverageDescription;
pub use error::{Error, Result};
pub use geo::BoundingBox;
pub use grid::{Grid3D, GridAssembler, MissingSlicePolicy};
pub use horizon::{covers, missing_timestamps, required_timestamps};
pub use products::{Area, Dataset, ServiceOption, ServiceType, find_service};
pub use raster::Raster;
pub use series::{NamedPoint, PointSeries, TimeSeries, interpolate_points};
pub use token::{TOKEN_URL, Token};
pub use transport::{HttpTransport, Transport};
