//! Command-line front end for the Météo-France WCS client.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use meteofr_wcs::{
    Area, BoundingBox, Client, ClientConfig, Dataset, MissingSlicePolicy, NamedPoint, RunTime,
    load_config, render,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "meteofr-wcs")]
#[command(about = "Fetch Météo-France AROME/ARPEGE forecast fields over WCS")]
struct Args {
    /// JSON file with {"username": ..., "password": ...}
    #[arg(long, env = "METEOFR_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// API token (skips GetAPIKey)
    #[arg(long, env = "METEOFR_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Forecast model: arome or arpege
    #[arg(long, default_value = "arome")]
    dataset: Dataset,

    /// Area: france, europe or world
    #[arg(long, default_value = "france")]
    area: Area,

    /// Grid step in degrees (needed when an area has several grids)
    #[arg(long, default_value = "0.01")]
    accuracy: f64,

    /// Trials per request
    #[arg(long, default_value = "5")]
    retry_max: usize,

    /// Seconds to wait between trials
    #[arg(long, default_value = "5")]
    retry_sleep: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List fields available on a 1-hour frequency
    Titles,

    /// List run times of a field
    RunTimes {
        #[arg(long)]
        title: String,
    },

    /// Download a field over an area and extract point series
    Fetch {
        #[arg(long)]
        title: String,

        /// `latest` or YYYY-MM-DDTHH
        #[arg(long, default_value = "latest")]
        run_time: RunTime,

        /// Hours ahead that the run time must cover
        #[arg(long, default_value = "24")]
        horizon: usize,

        /// lon_min,lat_min,lon_max,lat_max
        #[arg(long, allow_hyphen_values = true)]
        bbox: BoundingBox,

        /// name:lon:lat, repeatable
        #[arg(long = "point", allow_hyphen_values = true)]
        points: Vec<NamedPoint>,

        /// Keep NaN slices for timestamps that could not be fetched
        #[arg(long)]
        gaps: bool,

        /// Write the point series as JSON here (stdout otherwise)
        #[arg(long)]
        series: Option<PathBuf>,

        /// Write one PNG per hour in this directory
        #[arg(long)]
        png_dir: Option<PathBuf>,

        /// Write an animated GIF
        #[arg(long)]
        gif: Option<PathBuf>,

        /// Write one GeoTIFF per hour in this directory
        #[arg(long)]
        tiff_dir: Option<PathBuf>,

        /// Image pixels per grid cell
        #[arg(long, default_value = "8")]
        pixel_size: u32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let cfg = match &args.credentials {
        Some(path) => ClientConfig::from_credentials_file(path, args.token.clone(), None)?,
        None => load_config(None, None, args.token.clone(), None)?,
    };

    let mut client = Client::with_config(cfg)?
        .with_retry_max(args.retry_max)
        .with_retry_sleep(Duration::from_secs(args.retry_sleep))
        .with_progress(true);

    let accuracy = match (args.dataset, args.area) {
        (Dataset::Arome, Area::France) => Some(args.accuracy),
        _ => None,
    };
    client
        .select_product(args.dataset, args.area, accuracy)
        .context("failed to select product")?;

    match args.command {
        Command::Titles => {
            for title in client.list_titles()? {
                println!("{}", title);
            }
        }
        Command::RunTimes { title } => {
            for run_time in client.list_available_run_times(Some(&title))? {
                println!("{}", run_time);
            }
        }
        Command::Fetch {
            title,
            run_time,
            horizon,
            bbox,
            points,
            gaps,
            series,
            png_dir,
            gif,
            tiff_dir,
            pixel_size,
        } => {
            if gaps {
                client = client.with_missing_slices(MissingSlicePolicy::Gap);
            }
            client.select_coverage_id(&title, run_time)?;
            let selection = client
                .set_complete_run_time(horizon)
                .with_context(|| format!("no run time of '{}' covers {} hour(s)", title, horizon))?;
            info!(coverage_id = %selection.coverage_id, "using coverage");

            client.set_bbox_of_interest(bbox.lon_min, bbox.lat_min, bbox.lon_max, bbox.lat_max)?;
            let grid = client.create_3d_array()?;
            let (h, w, n) = grid.shape();
            info!(height = h, width = w, times = n, gaps = grid.gaps().len(), "grid ready");

            if !points.is_empty() {
                let ts = client.create_time_series(&grid, &points)?;
                let json = serde_json::to_string_pretty(&ts)?;
                match series {
                    Some(path) => std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?,
                    None => println!("{}", json),
                }
            }

            let prefix = selection_prefix(&client);
            if let Some(dir) = png_dir {
                render::save_pngs(&grid, &dir, &prefix, pixel_size)?;
            }
            if let Some(path) = gif {
                render::save_animation(&grid, &path, Duration::from_millis(300), pixel_size)?;
            }
            if let Some(dir) = tiff_dir {
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("failed to create directory {}", dir.display()))?;
                for (t, time) in grid.times().iter().enumerate() {
                    if let Some(raster) = grid.slice_raster(t) {
                        let path = dir.join(format!("{}_{}.tif", prefix, time.format("%Y%m%d%H")));
                        std::fs::write(&path, raster.encode_geotiff()?)?;
                    }
                }
            }
        }
    }

    Ok(())
}

fn selection_prefix(client: &Client) -> String {
    client
        .selection()
        .map(|s| {
            s.coverage_id
                .split("___")
                .next()
                .unwrap_or("coverage")
                .to_lowercase()
        })
        .unwrap_or_else(|| "coverage".to_string())
}
