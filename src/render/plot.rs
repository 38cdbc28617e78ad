//! Waveform and spectrogram images

use crate::audio::stft::power_spectrogram;
use crate::error::{AppError, Result};
use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Dynamic range shown in spectrograms
const SPECTROGRAM_RANGE_DB: f32 = 80.0;

const BACKGROUND: Rgb<u8> = Rgb([250, 250, 252]);
const AXIS: Rgb<u8> = Rgb([180, 180, 190]);
const TRACE: Rgb<u8> = Rgb([31, 119, 180]);

/// Anchors of a perceptually ordered dark-to-bright colormap
const COLORMAP: [[f32; 3]; 5] = [
    [68.0, 1.0, 84.0],
    [59.0, 82.0, 139.0],
    [33.0, 145.0, 140.0],
    [94.0, 201.0, 98.0],
    [253.0, 231.0, 37.0],
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlotConfig {
    pub width: u32,
    pub height: u32,
    /// Spectrogram window length
    pub nfft: usize,
    /// Spectrogram window overlap
    pub noverlap: usize,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 200,
            nfft: 1024,
            noverlap: 512,
        }
    }
}

fn check_plottable(samples: &[f32], config: &PlotConfig) -> Result<()> {
    if config.width == 0 || config.height == 0 {
        return Err(AppError::Render(format!(
            "Plot size {}x{} is empty",
            config.width, config.height
        )));
    }
    if samples.is_empty() {
        return Err(AppError::Render("No samples to plot".into()));
    }
    if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
        return Err(AppError::Render(format!("Sample {} is not finite", index)));
    }
    Ok(())
}

/// Amplitude envelope, one min/max bar per pixel column, peak normalised
pub fn render_waveform(samples: &[f32], config: &PlotConfig) -> Result<RgbImage> {
    check_plottable(samples, config)?;

    let (width, height) = (config.width, config.height);
    let mut img = ImageBuffer::from_pixel(width, height, BACKGROUND);

    let mid = (height - 1) as f32 / 2.0;
    draw_line_segment_mut(&mut img, (0.0, mid), ((width - 1) as f32, mid), AXIS);

    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak == 0.0 {
        return Ok(img);
    }

    let per_column = samples.len() as f64 / width as f64;
    for x in 0..width {
        let start = (x as f64 * per_column) as usize;
        if start >= samples.len() {
            break;
        }
        let end = (((x + 1) as f64 * per_column) as usize).clamp(start + 1, samples.len());

        let column = &samples[start..end];
        let lo = column.iter().copied().fold(f32::INFINITY, f32::min) / peak;
        let hi = column.iter().copied().fold(f32::NEG_INFINITY, f32::max) / peak;

        // y grows downward
        let y_top = mid - hi * mid;
        let y_bottom = mid - lo * mid;
        draw_line_segment_mut(&mut img, (x as f32, y_top), (x as f32, y_bottom), TRACE);
    }

    Ok(img)
}

/// Power spectrogram in dB, low frequencies at the bottom
pub fn render_spectrogram(samples: &[f32], config: &PlotConfig) -> Result<RgbImage> {
    check_plottable(samples, config)?;
    if config.noverlap >= config.nfft {
        return Err(AppError::Render(format!(
            "Overlap {} must be smaller than window {}",
            config.noverlap, config.nfft
        )));
    }

    let power = power_spectrogram(samples, config.nfft, config.noverlap);
    let (bins, frames) = power.dim();

    let db = power.mapv(|p| 10.0 * (p + 1e-12).log10());
    let max_db = db.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let min_db = max_db - SPECTROGRAM_RANGE_DB;

    let (width, height) = (config.width, config.height);
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        let frame = (x as usize * frames / width as usize).min(frames - 1);
        let bin = ((height - 1 - y) as usize * bins / height as usize).min(bins - 1);
        let level = (db[[bin, frame]] - min_db) / SPECTROGRAM_RANGE_DB;
        colormap(level)
    });

    Ok(img)
}

/// Map `level` in [0, 1] onto the colormap
pub fn colormap(level: f32) -> Rgb<u8> {
    let level = if level.is_finite() { level.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = level * (COLORMAP.len() - 1) as f32;
    let index = (scaled.floor() as usize).min(COLORMAP.len() - 2);
    let t = scaled - index as f32;

    let (a, b) = (COLORMAP[index], COLORMAP[index + 1]);
    let channel = |c: usize| (a[c] + (b[c] - a[c]) * t).round() as u8;
    Rgb([channel(0), channel(1), channel(2)])
}

pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| AppError::Render(format!("PNG encoding failed: {}", e)))?;
    Ok(bytes)
}
