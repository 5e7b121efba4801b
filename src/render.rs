//! Static images and animations of a [`Grid3D`].

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, Rgba, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{Error, Result};
use crate::grid::Grid3D;

const STOPS: [(f32, [u8; 3]); 5] = [
    (0.0, [49, 54, 149]),
    (0.25, [116, 173, 209]),
    (0.5, [255, 255, 191]),
    (0.75, [244, 109, 67]),
    (1.0, [165, 0, 38]),
];

/// Linear diverging blue → red scale between `min` and `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScale {
    pub min: f32,
    pub max: f32,
}

impl ColorScale {
    /// A scale spanning every finite value of the grid, so all frames share colours.
    pub fn from_grid(grid: &Grid3D) -> Option<Self> {
        grid.value_range().map(|(min, max)| Self { min, max })
    }

    pub fn color(&self, value: f32) -> Rgba<u8> {
        if !value.is_finite() {
            return Rgba([0, 0, 0, 0]);
        }
        let span = self.max - self.min;
        let f = if span > 0.0 {
            ((value - self.min) / span).clamp(0.0, 1.0)
        } else {
            0.5
        };
        let upper = STOPS
            .iter()
            .position(|(s, _)| *s >= f)
            .unwrap_or(STOPS.len() - 1)
            .max(1);
        let (s0, c0) = STOPS[upper - 1];
        let (s1, c1) = STOPS[upper];
        let w = if s1 > s0 { (f - s0) / (s1 - s0) } else { 0.0 };
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * w).round() as u8;
        Rgba([mix(c0[0], c1[0]), mix(c0[1], c1[1]), mix(c0[2], c1[2]), 255])
    }
}

/// Renders slice `t`, each grid cell drawn as a `pixel_size` square. North is up.
pub fn render_slice(
    grid: &Grid3D,
    t: usize,
    scale: &ColorScale,
    pixel_size: u32,
) -> Result<RgbaImage> {
    let slice = grid
        .slice(t)
        .ok_or_else(|| Error::InvalidSelection(format!("no time slice {}", t)))?;
    let px = pixel_size.max(1);
    let width = grid.width() as u32;
    Ok(RgbaImage::from_fn(width * px, grid.height() as u32 * px, |x, y| {
        let (col, row) = ((x / px) as usize, (y / px) as usize);
        scale.color(slice[row * grid.width() + col])
    }))
}

/// Writes one PNG per time slice as `<prefix>_<YYYYmmddHH>.png` in `dir`.
pub fn save_pngs(
    grid: &Grid3D,
    dir: &Path,
    prefix: &str,
    pixel_size: u32,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let scale = ColorScale::from_grid(grid).ok_or(Error::EmptyGrid)?;
    let mut paths = Vec::with_capacity(grid.times().len());
    for (t, time) in grid.times().iter().enumerate() {
        let path = dir.join(format!("{}_{}.png", prefix, time.format("%Y%m%d%H")));
        render_slice(grid, t, &scale, pixel_size)?.save(&path)?;
        paths.push(path);
    }
    info!(count = paths.len(), dir = %dir.display(), "wrote slice images");
    Ok(paths)
}

/// Writes all slices as a looping animated GIF.
pub fn save_animation(
    grid: &Grid3D,
    path: &Path,
    frame_delay: Duration,
    pixel_size: u32,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let scale = ColorScale::from_grid(grid).ok_or(Error::EmptyGrid)?;
    let mut encoder = GifEncoder::new(BufWriter::new(File::create(path)?));
    encoder.set_repeat(Repeat::Infinite)?;
    for t in 0..grid.times().len() {
        let frame = Frame::from_parts(
            render_slice(grid, t, &scale, pixel_size)?,
            0,
            0,
            Delay::from_saturating_duration(frame_delay),
        );
        encoder.encode_frame(frame)?;
    }
    info!(frames = grid.times().len(), path = %path.display(), "wrote animation");
    Ok(())
}
