//! Rendering of statistical maps as PNG images.
//!
//! [`StatMapPlot`] draws three orthogonal slices (sagittal, coronal, axial)
//! through the voxel with the largest absolute value of the map. Each panel
//! shows the background image in grey with the map overlaid in a diverging
//! cold/hot colormap; voxels whose absolute value is below the threshold are
//! left transparent.

use std::path::Path;

use ndarray::{ArrayView2, Axis};
use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::{info, warn};

use crate::volume::Volume3;

/// Errors raised while rendering.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("map shape {stat:?} does not match background shape {background:?}")]
    ShapeMismatch { stat: [usize; 3], background: [usize; 3] },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("drawing backend error: {0}")]
    Backend(String),
}

fn backend_error(err: impl std::fmt::Display) -> RenderError {
    RenderError::Backend(err.to_string())
}

/// Map `t` in `[-1, 1]` to a cold (blue to cyan) / hot (red to yellow) color.
pub fn diverging_color(t: f64) -> RGBColor {
    let t = t.clamp(-1.0, 1.0);
    let ramp = |v: f64| (255.0 * v) as u8;
    if t >= 0.0 {
        RGBColor(255, ramp(t), 0)
    } else {
        RGBColor(0, ramp(-t), 255)
    }
}

fn grey(value: f32, (lo, hi): (f32, f32)) -> RGBColor {
    let norm = if hi > lo { ((value - lo) / (hi - lo)).clamp(0.0, 1.0) } else { 0.0 };
    let g = (255.0 * norm) as u8;
    RGBColor(g, g, g)
}

/// Coordinates of the voxel with the largest absolute value.
///
/// Falls back to the volume center when every voxel is zero or non-finite.
pub fn peak_voxel(volume: &Volume3) -> [usize; 3] {
    let best = volume
        .data()
        .indexed_iter()
        .filter(|(_, v)| v.is_finite() && **v != 0.0)
        .fold(None, |best: Option<((usize, usize, usize), f32)>, (idx, &v)| match best {
            Some((_, b)) if b >= v.abs() => best,
            _ => Some((idx, v.abs())),
        });
    match best {
        Some(((x, y, z), _)) => [x, y, z],
        None => {
            let [nx, ny, nz] = volume.shape();
            [nx / 2, ny / 2, nz / 2]
        }
    }
}

/// Three-panel orthogonal slice view of a statistical map.
#[derive(Debug, Clone)]
pub struct StatMapPlot {
    /// Drawn above the panels; nothing is drawn when empty.
    pub title: String,
    /// Absolute values below this are not overlaid.
    pub threshold: f32,
    /// Image size in pixels.
    pub size: (u32, u32),
}

impl Default for StatMapPlot {
    fn default() -> Self {
        Self {
            title: "SVM weights".to_string(),
            threshold: 1e-6,
            size: (1200, 440),
        }
    }
}

impl StatMapPlot {
    /// Render `stat` over `background` to a PNG at `path`.
    ///
    /// Returns the slice coordinates used.
    pub fn render(
        &self,
        stat: &Volume3,
        background: &Volume3,
        path: &Path,
    ) -> Result<[usize; 3], RenderError> {
        if stat.shape() != background.shape() {
            return Err(RenderError::ShapeMismatch {
                stat: stat.shape(),
                background: background.shape(),
            });
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let cut = peak_voxel(stat);
        let [cx, cy, cz] = cut;
        let vmax = stat
            .data()
            .iter()
            .filter(|v| v.is_finite())
            .fold(0.0f32, |m, v| m.max(v.abs()));
        let bg_range = background
            .data()
            .iter()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        let root = BitMapBackend::new(path, self.size).into_drawing_area();
        root.fill(&BLACK).map_err(backend_error)?;
        let body = if self.title.is_empty() {
            root.clone()
        } else {
            match root.titled(&self.title, ("sans-serif", 24).into_font().color(&WHITE)) {
                Ok(area) => area,
                Err(err) => {
                    warn!(error = %err, "cannot draw title, rendering without it");
                    root.clone()
                }
            }
        };

        let panels = body.split_evenly((1, 3));
        let layer = SliceLayer {
            bg_range,
            vmax,
            threshold: self.threshold,
        };
        let (stat, background) = (stat.data(), background.data());
        // sagittal (y, z), coronal (x, z), axial (x, y)
        layer.draw(&panels[0], background.index_axis(Axis(0), cx), stat.index_axis(Axis(0), cx))?;
        layer.draw(&panels[1], background.index_axis(Axis(1), cy), stat.index_axis(Axis(1), cy))?;
        layer.draw(&panels[2], background.index_axis(Axis(2), cz), stat.index_axis(Axis(2), cz))?;

        root.present().map_err(backend_error)?;
        info!(path = %path.display(), cut = ?cut, vmax, "rendered statistical map");
        Ok(cut)
    }
}

struct SliceLayer {
    bg_range: (f32, f32),
    vmax: f32,
    threshold: f32,
}

impl SliceLayer {
    /// Draw one slice; first array axis runs left to right, second bottom to top.
    fn draw(
        &self,
        area: &DrawingArea<BitMapBackend<'_>, Shift>,
        background: ArrayView2<'_, f32>,
        stat: ArrayView2<'_, f32>,
    ) -> Result<(), RenderError> {
        let (w, h) = background.dim();
        let mut chart = ChartBuilder::on(area)
            .margin(5)
            .build_cartesian_2d(0f64..w as f64, 0f64..h as f64)
            .map_err(backend_error)?;

        let cells = background.indexed_iter().map(|((i, j), &bg)| {
            let weight = stat[[i, j]];
            let color = if self.vmax > 0.0 && weight.is_finite() && weight.abs() >= self.threshold {
                diverging_color((weight / self.vmax) as f64)
            } else {
                grey(bg, self.bg_range)
            };
            let (x, y) = (i as f64, j as f64);
            Rectangle::new([(x, y), (x + 1.0, y + 1.0)], color.filled())
        });
        chart.draw_series(cells).map_err(backend_error)?;
        Ok(())
    }
}
