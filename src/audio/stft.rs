//! Short-time Fourier transform helpers shared by the denoiser and the
//! spectrogram plots.

use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

/// STFT framing parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StftConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    /// Pad `n_fft / 2` zeros on both sides so frame `t` is centred on sample `t * hop`
    pub center: bool,
}

impl StftConfig {
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        Self {
            n_fft: n_fft.max(2),
            hop_length: hop_length.max(1),
            center: true,
        }
    }

    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }
}

/// Periodic Hann window
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}

fn pad_signal(samples: &[f32], config: &StftConfig) -> Vec<f32> {
    let pad = if config.center { config.n_fft / 2 } else { 0 };
    let mut padded = vec![0.0f32; pad];
    padded.extend_from_slice(samples);
    padded.extend(std::iter::repeat(0.0).take(pad));

    // Short signals still get one full frame
    if padded.len() < config.n_fft {
        padded.resize(config.n_fft, 0.0);
    }
    padded
}

/// Complex STFT, shape `[n_fft / 2 + 1, frames]`
pub fn stft(samples: &[f32], config: &StftConfig) -> Array2<Complex<f32>> {
    let n_fft = config.n_fft;
    let hop = config.hop_length;
    let window = hann_window(n_fft);
    let padded = pad_signal(samples, config);

    let num_frames = (padded.len() - n_fft) / hop + 1;
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);

    let mut spectrum = Array2::<Complex<f32>>::zeros((config.num_bins(), num_frames));
    let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];

    for frame_idx in 0..num_frames {
        let start = frame_idx * hop;
        for ((slot, &s), &w) in buffer
            .iter_mut()
            .zip(&padded[start..start + n_fft])
            .zip(window.iter())
        {
            *slot = Complex::new(s * w, 0.0);
        }

        fft.process(&mut buffer);

        for (bin, c) in buffer.iter().take(config.num_bins()).enumerate() {
            spectrum[[bin, frame_idx]] = *c;
        }
    }

    spectrum
}

/// Inverse of [`stft`] by weighted overlap-add, trimmed or padded to `length`
pub fn istft(spectrum: &Array2<Complex<f32>>, config: &StftConfig, length: usize) -> Vec<f32> {
    let n_fft = config.n_fft;
    let hop = config.hop_length;
    let num_bins = config.num_bins();
    let num_frames = spectrum.ncols();
    let window = hann_window(n_fft);

    let out_len = n_fft + hop * num_frames.saturating_sub(1);
    let mut output = vec![0.0f32; out_len];
    let mut window_sum = vec![0.0f32; out_len];

    let mut planner = FftPlanner::<f32>::new();
    let ifft = planner.plan_fft_inverse(n_fft);
    let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
    let norm = 1.0 / n_fft as f32;

    for frame_idx in 0..num_frames {
        // Rebuild the Hermitian-symmetric full spectrum
        for bin in 0..num_bins.min(spectrum.nrows()) {
            buffer[bin] = spectrum[[bin, frame_idx]];
        }
        for bin in num_bins..n_fft {
            buffer[bin] = buffer[n_fft - bin].conj();
        }

        ifft.process(&mut buffer);

        let start = frame_idx * hop;
        for i in 0..n_fft {
            output[start + i] += buffer[i].re * norm * window[i];
            window_sum[start + i] += window[i] * window[i];
        }
    }

    for (sample, &weight) in output.iter_mut().zip(window_sum.iter()) {
        if weight > 1e-8 {
            *sample /= weight;
        }
    }

    let offset = if config.center { n_fft / 2 } else { 0 };
    let mut result: Vec<f32> = output.into_iter().skip(offset).take(length).collect();
    result.resize(length, 0.0);
    result
}

/// Power spectral density frames in the style of a plotting `specgram`:
/// un-centred frames of `nfft` samples advancing by `nfft - noverlap`
pub fn power_spectrogram(samples: &[f32], nfft: usize, noverlap: usize) -> Array2<f32> {
    let hop = nfft.saturating_sub(noverlap).max(1);
    let config = StftConfig {
        center: false,
        ..StftConfig::new(nfft, hop)
    };
    let window = hann_window(config.n_fft);
    let window_energy: f32 = window.iter().map(|w| w * w).sum();

    stft(samples, &config).mapv(|c| c.norm_sqr() / window_energy)
}
