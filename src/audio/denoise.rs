//! Spectral-gating noise reduction
//!
//! Each separated source is cleaned on its own with the same fixed
//! parameters. Two gates are available:
//! - non-stationary (default): the noise floor of every frequency bin is
//!   tracked by a slow zero-phase smoother and bins rising well above it
//!   pass through a sigmoid mask;
//! - stationary: a single per-bin threshold (mean + k * std in dB) over
//!   the whole clip gives a binary mask.
//!
//! The mask is blurred over frequency and time before it is applied.

use crate::audio::stft::{istft, stft, StftConfig};
use crate::error::{AppError, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

const EPS: f32 = 1e-10;

/// Noise gate flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum NoiseReductionMode {
    Stationary,
    #[default]
    NonStationary,
}

/// Parameters of the spectral gate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoiseReductionConfig {
    pub mode: NoiseReductionMode,
    /// Fraction of the gated energy that is removed (0-1)
    pub prop_decrease: f32,
    pub n_fft: usize,
    pub hop_length: usize,
    /// Time constant of the noise floor tracker, in seconds
    pub time_constant_s: f32,
    /// Mask blur extent over frequency, in Hz
    pub freq_mask_smooth_hz: f32,
    /// Mask blur extent over time, in milliseconds
    pub time_mask_smooth_ms: f32,
    /// How far above the floor (as a ratio) a bin must rise to pass
    pub thresh_n_mult_nonstationary: f32,
    pub sigmoid_slope_nonstationary: f32,
    /// Standard deviations above the mean dB level for the stationary gate
    pub n_std_thresh_stationary: f32,
}

impl Default for NoiseReductionConfig {
    fn default() -> Self {
        Self {
            mode: NoiseReductionMode::NonStationary,
            prop_decrease: 1.0,
            n_fft: 1024,
            hop_length: 256,
            time_constant_s: 2.0,
            freq_mask_smooth_hz: 500.0,
            time_mask_smooth_ms: 50.0,
            thresh_n_mult_nonstationary: 2.0,
            sigmoid_slope_nonstationary: 10.0,
            n_std_thresh_stationary: 1.5,
        }
    }
}

impl NoiseReductionConfig {
    pub fn stationary() -> Self {
        Self {
            mode: NoiseReductionMode::Stationary,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.n_fft < 4 || self.hop_length == 0 || self.hop_length > self.n_fft {
            return Err(AppError::InvalidInput(format!(
                "Invalid STFT framing: n_fft={}, hop={}",
                self.n_fft, self.hop_length
            )));
        }
        if !(0.0..=1.0).contains(&self.prop_decrease) {
            return Err(AppError::InvalidInput(format!(
                "prop_decrease must be within 0-1, got {}",
                self.prop_decrease
            )));
        }
        Ok(())
    }
}

/// Attenuate background noise; output length equals input length
pub fn reduce_noise(
    samples: &[f32],
    sample_rate: u32,
    config: &NoiseReductionConfig,
) -> Result<Vec<f32>> {
    config.validate()?;
    if samples.is_empty() {
        return Ok(Vec::new());
    }
    if sample_rate == 0 {
        return Err(AppError::InvalidInput("Sample rate must be positive".into()));
    }

    let stft_config = StftConfig::new(config.n_fft, config.hop_length);
    let mut spectrum = stft(samples, &stft_config);
    let magnitude = spectrum.mapv(|c| c.norm());

    let mask = match config.mode {
        NoiseReductionMode::NonStationary => nonstationary_mask(&magnitude, sample_rate, config),
        NoiseReductionMode::Stationary => stationary_mask(&magnitude, config),
    };

    let (freq_kernel, time_kernel) = smoothing_kernels(sample_rate, config);
    let mask = smooth_mask(&mask, &freq_kernel, &time_kernel);
    let mask = mask.mapv(|m| m * config.prop_decrease + (1.0 - config.prop_decrease));

    debug!(
        "Noise gate ({:?}): {} bins x {} frames, mean mask {:.3}",
        config.mode,
        mask.nrows(),
        mask.ncols(),
        mask.mean().unwrap_or(0.0)
    );

    spectrum.zip_mut_with(&mask, |c, &m| *c *= m);

    Ok(istft(&spectrum, &stft_config, samples.len()))
}

fn nonstationary_mask(
    magnitude: &Array2<f32>,
    sample_rate: u32,
    config: &NoiseReductionConfig,
) -> Array2<f32> {
    let t_frames = config.time_constant_s * sample_rate as f32 / config.hop_length as f32;
    let coeff = smoothing_coefficient(t_frames);

    let mut mask = Array2::<f32>::zeros(magnitude.raw_dim());
    for (bin, row) in magnitude.axis_iter(Axis(0)).enumerate() {
        let values = row.to_vec();
        let floor = zero_phase_smooth(&values, coeff);
        for (frame, (&mag, &noise)) in row.iter().zip(floor.iter()).enumerate() {
            let above = (mag - noise) / noise.max(EPS);
            mask[[bin, frame]] = sigmoid(
                above - config.thresh_n_mult_nonstationary,
                config.sigmoid_slope_nonstationary,
            );
        }
    }
    mask
}

fn stationary_mask(magnitude: &Array2<f32>, config: &NoiseReductionConfig) -> Array2<f32> {
    let db = amp_to_db(magnitude, 80.0);

    let mut mask = Array2::<f32>::zeros(magnitude.raw_dim());
    for (bin, row) in db.axis_iter(Axis(0)).enumerate() {
        let n = row.len() as f32;
        let mean = row.sum() / n;
        let std = (row.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n).sqrt();
        let threshold = mean + std * config.n_std_thresh_stationary;

        for (frame, &value) in row.iter().enumerate() {
            mask[[bin, frame]] = if value > threshold { 1.0 } else { 0.0 };
        }
    }
    mask
}

/// Magnitude to dB, floored `top_db` below each bin's peak
fn amp_to_db(magnitude: &Array2<f32>, top_db: f32) -> Array2<f32> {
    let mut db = magnitude.mapv(|m| 20.0 * (m + EPS).log10());
    for mut row in db.axis_iter_mut(Axis(0)) {
        let peak = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| v.max(peak - top_db));
    }
    db
}

fn sigmoid(x: f32, slope: f32) -> f32 {
    1.0 / (1.0 + (-x * slope).exp())
}

/// Coefficient of a one-pole smoother with a time constant of `t_frames`
fn smoothing_coefficient(t_frames: f32) -> f32 {
    if t_frames <= 0.0 {
        return 1.0;
    }
    ((1.0 + 4.0 * t_frames * t_frames).sqrt() - 1.0) / (2.0 * t_frames * t_frames)
}

/// Forward-backward one-pole low-pass; both passes start at steady state
fn zero_phase_smooth(values: &[f32], coeff: f32) -> Vec<f32> {
    let mut forward = Vec::with_capacity(values.len());
    let mut state = values.first().copied().unwrap_or(0.0);
    for &v in values {
        state = coeff * v + (1.0 - coeff) * state;
        forward.push(state);
    }

    let mut state = forward.last().copied().unwrap_or(0.0);
    for v in forward.iter_mut().rev() {
        state = coeff * *v + (1.0 - coeff) * state;
        *v = state;
    }
    forward
}

/// Triangular kernel of `2n + 1` taps, normalized to unit sum
fn triangular_kernel(n: usize) -> Vec<f32> {
    let step = 1.0 / (n + 1) as f32;
    let rising = (1..=n).map(|i| i as f32 * step);
    let falling = (0..=n).map(|j| 1.0 - j as f32 * step);
    let kernel: Vec<f32> = rising.chain(falling).collect();

    let sum: f32 = kernel.iter().sum();
    kernel.into_iter().map(|k| k / sum).collect()
}

fn smoothing_kernels(sample_rate: u32, config: &NoiseReductionConfig) -> (Vec<f32>, Vec<f32>) {
    let bin_hz = sample_rate as f32 / (config.n_fft as f32 / 2.0);
    let frame_ms = config.hop_length as f32 / sample_rate as f32 * 1000.0;

    let n_grad_freq = (config.freq_mask_smooth_hz / bin_hz).max(0.0) as usize;
    let n_grad_time = (config.time_mask_smooth_ms / frame_ms).max(0.0) as usize;

    (triangular_kernel(n_grad_freq), triangular_kernel(n_grad_time))
}

/// Separable "same"-size convolution with zero boundaries
fn smooth_mask(mask: &Array2<f32>, freq_kernel: &[f32], time_kernel: &[f32]) -> Array2<f32> {
    let along_freq = convolve_axis(mask, freq_kernel, Axis(0));
    convolve_axis(&along_freq, time_kernel, Axis(1))
}

fn convolve_axis(input: &Array2<f32>, kernel: &[f32], axis: Axis) -> Array2<f32> {
    if kernel.len() <= 1 {
        return input.clone();
    }

    let half = (kernel.len() / 2) as isize;
    let mut output = Array2::<f32>::zeros(input.raw_dim());

    for (mut out_lane, in_lane) in output
        .lanes_mut(axis)
        .into_iter()
        .zip(input.lanes(axis))
    {
        let len = in_lane.len() as isize;
        for i in 0..len {
            let mut acc = 0.0;
            for (k, &weight) in kernel.iter().enumerate() {
                let j = i + k as isize - half;
                if j >= 0 && j < len {
                    acc += weight * in_lane[j as usize];
                }
            }
            out_lane[i as usize] = acc;
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    /// Deterministic white-ish noise in [-amplitude, amplitude]
    fn noise(seed: u64, amplitude: f32, len: usize) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let unit = ((state >> 33) as f32 / (1u64 << 31) as f32) * 2.0 - 1.0;
                unit * amplitude
            })
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_length_and_rate_preserved() {
        for len in [1usize, 700, 16000, 40001] {
            let input = noise(len as u64, 0.1, len);
            let output = reduce_noise(&input, 16000, &NoiseReductionConfig::default()).unwrap();
            assert_eq!(output.len(), len);
        }
    }

    #[test]
    fn test_empty_input_gives_empty_output() {
        let output = reduce_noise(&[], 16000, &NoiseReductionConfig::default()).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_stationary_noise_is_attenuated() {
        let input = noise(7, 0.05, 32000);
        let output = reduce_noise(&input, 16000, &NoiseReductionConfig::default()).unwrap();

        assert!(
            rms(&output) < rms(&input) * 0.5,
            "noise rms {} -> {}",
            rms(&input),
            rms(&output)
        );
    }

    #[test]
    fn test_loud_burst_survives_nonstationary_gate() {
        // Quiet bed with a loud broadband burst from 1.5s to 2s
        let mut input = noise(11, 0.01, 64000);
        let burst = noise(23, 0.5, 8000);
        for (s, b) in input[24000..32000].iter_mut().zip(burst.iter()) {
            *s += b;
        }

        let output = reduce_noise(&input, 16000, &NoiseReductionConfig::default()).unwrap();

        let burst_ratio = rms(&output[25000..31000]) / rms(&input[25000..31000]);
        let bed_ratio = rms(&output[2000..10000]) / rms(&input[2000..10000]);
        assert!(burst_ratio > 0.3, "burst kept {}", burst_ratio);
        assert!(bed_ratio < 0.2, "bed kept {}", bed_ratio);
        assert!(burst_ratio > 3.0 * bed_ratio);
    }

    #[test]
    fn test_stationary_mode_keeps_length() {
        let input = noise(3, 0.2, 12345);
        let output = reduce_noise(&input, 16000, &NoiseReductionConfig::stationary()).unwrap();
        assert_eq!(output.len(), input.len());
        assert!(output.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_zero_prop_decrease_is_passthrough() {
        let input = noise(5, 0.3, 8000);
        let config = NoiseReductionConfig {
            prop_decrease: 0.0,
            ..NoiseReductionConfig::default()
        };
        let output = reduce_noise(&input, 16000, &config).unwrap();

        let max_err = input
            .iter()
            .zip(output.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 1e-3);
    }

    #[test]
    fn test_invalid_framing_rejected() {
        let config = NoiseReductionConfig {
            hop_length: 0,
            ..NoiseReductionConfig::default()
        };
        assert!(reduce_noise(&[0.1; 100], 16000, &config).is_err());
    }

    #[test]
    fn test_triangular_kernel_shape() {
        let kernel = triangular_kernel(2);
        assert_eq!(kernel.len(), 5);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(kernel[2] > kernel[1] && kernel[1] > kernel[0]);
        assert!((kernel[0] - kernel[4]).abs() < 1e-6);

        assert_eq!(triangular_kernel(0), vec![1.0]);
    }
}
