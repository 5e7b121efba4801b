use anyhow::Result;
use meteofr_wcs::{Area, Client, Dataset, NamedPoint, RunTime, render};
use std::path::Path;
use std::time::Duration;

fn main() -> Result<()> {
    // Example program that calls the library API.
    // Configure authentication via env vars or a `meteofr_credentials.json` file.
    let mut client = Client::from_env()?.with_progress(true);

    client.select_product(Dataset::Arome, Area::France, Some(0.01))?;
    client.select_coverage_id(
        "Temperature at specified height level above ground",
        RunTime::Latest,
    )?;
    client.set_complete_run_time(24)?;
    client.set_bbox_of_interest(1.0, 43.0, 2.0, 44.0)?;

    let grid = client.create_3d_array()?;
    let points = [
        NamedPoint::new("Toulouse", 1.44, 43.6),
        NamedPoint::new("Muret", 1.33, 43.46),
    ];
    let series = client.create_time_series(&grid, &points)?;
    println!("{}", serde_json::to_string_pretty(&series)?);

    render::save_animation(&grid, Path::new("t2m.gif"), Duration::from_millis(300), 8)?;
    Ok(())
}
