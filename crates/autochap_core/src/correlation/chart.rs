//! Correlation curve charts.
//!
//! Charts are a best-effort diagnostic. The matcher hands a [`ChartRequest`]
//! to a [`ChartSink`] on a detached thread and only ever logs the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use image::{Rgb, RgbImage};

use crate::audio::ThemeId;

/// Chart width in pixels.
const CHART_WIDTH: u32 = 1200;
/// Chart height in pixels.
const CHART_HEIGHT: u32 = 400;
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([160, 160, 160]);
const CURVE: Rgb<u8> = Rgb([31, 119, 180]);
const PEAK: Rgb<u8> = Rgb([214, 39, 40]);

/// One correlation curve to render.
#[derive(Debug, Clone)]
pub struct ChartRequest {
    pub theme: ThemeId,
    pub matched: bool,
    pub curve: Vec<f64>,
    /// Index of the correlation peak.
    pub peak_index: usize,
}

impl ChartRequest {
    /// File name keyed by theme id and outcome.
    pub fn file_name(&self) -> String {
        if self.matched {
            format!("{}_matched.png", self.theme)
        } else {
            format!("{}.png", self.theme)
        }
    }
}

/// Errors from chart rendering. Never propagated past the matcher.
#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("Empty correlation curve for {0}")]
    EmptyCurve(ThemeId),

    #[error("Failed to create chart directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode chart: {0}")]
    Encode(#[from] image::ImageError),
}

/// Destination for correlation charts.
pub trait ChartSink: Send + Sync {
    fn render(&self, request: &ChartRequest) -> Result<(), ChartError>;
}

/// Sink that discards every chart.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullChartSink;

impl ChartSink for NullChartSink {
    fn render(&self, _request: &ChartRequest) -> Result<(), ChartError> {
        Ok(())
    }
}

/// Sink that draws the curve into a PNG under a charts directory.
#[derive(Debug, Clone)]
pub struct PngChartSink {
    dir: PathBuf,
}

impl PngChartSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ChartSink for PngChartSink {
    fn render(&self, request: &ChartRequest) -> Result<(), ChartError> {
        let image = draw_curve(request)?;
        std::fs::create_dir_all(&self.dir)?;
        image.save(self.dir.join(request.file_name()))?;
        Ok(())
    }
}

/// Render the request on a detached thread. Failures are logged.
pub fn spawn_render(sink: Arc<dyn ChartSink>, request: ChartRequest) -> JoinHandle<()> {
    thread::spawn(move || {
        if let Err(e) = sink.render(&request) {
            tracing::warn!("{} Could not save chart: {}", request.theme, e);
        } else {
            tracing::debug!("{} chart written ({})", request.theme, request.file_name());
        }
    })
}

/// Min/max envelope of the curve per pixel column.
fn draw_curve(request: &ChartRequest) -> Result<RgbImage, ChartError> {
    let curve = &request.curve;
    if curve.is_empty() {
        return Err(ChartError::EmptyCurve(request.theme));
    }

    let (lo, hi) = curve
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let (lo, hi) = if lo.is_finite() && hi > lo {
        (lo, hi)
    } else {
        (lo.min(0.0) - 1.0, hi.max(0.0) + 1.0)
    };

    let mut image = RgbImage::from_pixel(CHART_WIDTH, CHART_HEIGHT, BACKGROUND);
    let to_row = |v: f64| -> u32 {
        let norm = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
        ((1.0 - norm) * (CHART_HEIGHT - 1) as f64).round() as u32
    };

    // Zero line
    if lo < 0.0 && hi > 0.0 {
        let zero = to_row(0.0);
        for x in 0..CHART_WIDTH {
            image.put_pixel(x, zero, AXIS);
        }
    }

    let per_column = curve.len() as f64 / CHART_WIDTH as f64;
    for x in 0..CHART_WIDTH {
        let from = (x as f64 * per_column).floor() as usize;
        if from >= curve.len() {
            break;
        }
        let to = (((x + 1) as f64 * per_column).ceil() as usize).clamp(from + 1, curve.len());
        let (col_lo, col_hi) = curve[from..to]
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), &v| (a.min(v), b.max(v)));
        if !col_lo.is_finite() {
            continue;
        }
        let (top, bottom) = (to_row(col_hi), to_row(col_lo));
        for y in top..=bottom {
            image.put_pixel(x, y, CURVE);
        }
    }

    let peak_x = ((request.peak_index as f64 / per_column) as u32).min(CHART_WIDTH - 1);
    for y in 0..CHART_HEIGHT {
        if y % 4 < 2 {
            image.put_pixel(peak_x, y, PEAK);
        }
    }

    Ok(image)
}
