use crate::error::{AppError, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

#[cfg(feature = "microphone")]
use crate::audio::processor::Waveform;
#[cfg(feature = "microphone")]
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
#[cfg(feature = "microphone")]
use parking_lot::Mutex;
#[cfg(feature = "microphone")]
use std::sync::Arc;

/// Rate requested from the capture device
pub const RECORD_SAMPLE_RATE: u32 = 16000;
pub const MIN_RECORD_SECS: u32 = 1;
pub const MAX_RECORD_SECS: u32 = 20;
pub const DEFAULT_RECORD_SECS: u32 = 5;

/// Whether live capture can be offered, decided once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MicrophoneCapability {
    #[serde(rename_all = "camelCase")]
    Available { device_name: String },
    Unavailable { reason: String },
}

impl MicrophoneCapability {
    /// Query the default input device
    pub fn detect() -> Self {
        let capability = query_default_input();
        match &capability {
            MicrophoneCapability::Available { device_name } => {
                info!("Microphone available: {}", device_name)
            }
            MicrophoneCapability::Unavailable { reason } => {
                warn!("Microphone unavailable: {}", reason)
            }
        }
        capability
    }

    pub fn is_available(&self) -> bool {
        matches!(self, MicrophoneCapability::Available { .. })
    }
}

#[cfg(feature = "microphone")]
fn query_default_input() -> MicrophoneCapability {
    let host = cpal::default_host();
    match host.default_input_device() {
        Some(device) => MicrophoneCapability::Available {
            device_name: device.name().unwrap_or_else(|_| "default".to_string()),
        },
        None => MicrophoneCapability::Unavailable {
            reason: format!("No input device on host {:?}", host.id()),
        },
    }
}

#[cfg(not(feature = "microphone"))]
fn query_default_input() -> MicrophoneCapability {
    MicrophoneCapability::Unavailable {
        reason: "Built without microphone support".to_string(),
    }
}

/// Check a requested recording length against the allowed range
pub fn validate_duration(duration_secs: u32) -> Result<Duration> {
    if !(MIN_RECORD_SECS..=MAX_RECORD_SECS).contains(&duration_secs) {
        return Err(AppError::InvalidInput(format!(
            "Recording duration must be between {} and {} seconds, got {}",
            MIN_RECORD_SECS, MAX_RECORD_SECS, duration_secs
        )));
    }
    Ok(Duration::from_secs(duration_secs as u64))
}

/// Record a fixed-length clip from the default input device
///
/// Blocks the calling thread for the whole duration. The stream is opened
/// at 16kHz mono when the device supports it, otherwise at the device's
/// default format (the preprocessor downmixes and resamples later).
#[cfg(feature = "microphone")]
pub fn record_clip(duration_secs: u32) -> Result<Waveform> {
    let duration = validate_duration(duration_secs)?;

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| AppError::Audio("No default input device".into()))?;

    info!("Using audio device: {:?}", device.name());

    let (config, sample_format) = pick_stream_config(&device)?;
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;

    info!(
        "Audio config: {}Hz, {} channels, {:?}",
        sample_rate, channels, sample_format
    );

    let buffer: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_capture_stream::<f32>(&device, &config, Arc::clone(&buffer))?,
        cpal::SampleFormat::I16 => build_capture_stream::<i16>(&device, &config, Arc::clone(&buffer))?,
        cpal::SampleFormat::U16 => build_capture_stream::<u16>(&device, &config, Arc::clone(&buffer))?,
        other => {
            return Err(AppError::Audio(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream.play().map_err(|e| AppError::Audio(e.to_string()))?;
    info!("Recording {}s...", duration_secs);
    std::thread::sleep(duration);

    if let Err(e) = stream.pause() {
        warn!("Failed to pause stream: {}", e);
    }
    drop(stream);

    let mut samples = std::mem::take(&mut *buffer.lock());
    let wanted = duration_secs as usize * sample_rate as usize * channels as usize;
    samples.truncate(wanted);

    info!(
        "Recording complete: {} samples ({:.2}s @ {}Hz)",
        samples.len(),
        samples.len() as f32 / (sample_rate as f32 * channels as f32),
        sample_rate
    );

    if samples.is_empty() {
        return Err(AppError::Audio("Input device delivered no samples".into()));
    }

    Ok(Waveform::new(samples, sample_rate, channels))
}

#[cfg(feature = "microphone")]
fn pick_stream_config(device: &cpal::Device) -> Result<(cpal::StreamConfig, cpal::SampleFormat)> {
    let wanted_rate = cpal::SampleRate(RECORD_SAMPLE_RATE);

    if let Ok(ranges) = device.supported_input_configs() {
        for range in ranges {
            if range.channels() == 1
                && range.min_sample_rate() <= wanted_rate
                && range.max_sample_rate() >= wanted_rate
            {
                let supported = range.with_sample_rate(wanted_rate);
                return Ok((supported.config(), supported.sample_format()));
            }
        }
    }

    warn!("Device has no 16kHz mono input mode, using its default config");
    let supported = device
        .default_input_config()
        .map_err(|e| AppError::Audio(e.to_string()))?;
    Ok((supported.config(), supported.sample_format()))
}

#[cfg(feature = "microphone")]
fn build_capture_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    use cpal::Sample;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                buffer
                    .lock()
                    .extend(data.iter().map(|&s| f32::from_sample(s)));
            },
            |err| warn!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| AppError::Audio(e.to_string()))
}
