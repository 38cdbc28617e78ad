use crate::error::{AppError, Result};
use rubato::{FftFixedInOut, Resampler};
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, info};

/// Sample rate the separation network was trained on
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Interleaved audio samples with their format
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of samples per channel
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_ms(&self) -> i64 {
        duration_ms(self.frames(), self.sample_rate)
    }

    /// Mono, 16kHz and non-empty: the shape the separation network accepts
    pub fn is_model_ready(&self) -> bool {
        self.channels == 1 && self.sample_rate == TARGET_SAMPLE_RATE && !self.samples.is_empty()
    }
}

/// Load a WAV file from disk
pub fn load_audio_file(path: &Path) -> Result<Waveform> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "wav" => {
            let reader = hound::WavReader::open(path).map_err(|e| {
                AppError::Decode(format!("{}: {}", path.display(), e))
            })?;
            decode_wav(reader)
        }
        "mp3" | "m4a" | "ogg" | "flac" => Err(AppError::Decode(format!(
            "Format {} not supported. Please convert to WAV.",
            extension
        ))),
        _ => Err(AppError::Decode(format!(
            "Unknown audio format: {}",
            path.display()
        ))),
    }
}

/// Decode an uploaded WAV payload
pub fn decode_wav_bytes(bytes: &[u8]) -> Result<Waveform> {
    let reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| AppError::Decode(e.to_string()))?;
    decode_wav(reader)
}

fn decode_wav<R: Read>(reader: hound::WavReader<R>) -> Result<Waveform> {
    let spec = reader.spec();

    info!(
        "Decoding WAV: {}Hz, {} channels, {} bits {:?}",
        spec.sample_rate, spec.channels, spec.bits_per_sample, spec.sample_format
    );

    if spec.sample_rate == 0 || spec.channels == 0 {
        return Err(AppError::Decode(format!(
            "Invalid WAV header: {}Hz, {} channels",
            spec.sample_rate, spec.channels
        )));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| AppError::Decode(e.to_string()))?
        }
    };

    if samples.len() < spec.channels as usize {
        return Err(AppError::Decode("WAV contains no audio frames".into()));
    }

    Ok(Waveform::new(samples, spec.sample_rate, spec.channels))
}

/// Average all channels into one, keeping the frame count
pub fn downmix_to_mono(waveform: Waveform) -> Waveform {
    let channels = waveform.channels as usize;
    if channels == 1 {
        return waveform;
    }

    debug!("Downmixing {} channels to mono", channels);

    let mono: Vec<f32> = waveform
        .samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    Waveform::mono(mono, waveform.sample_rate)
}

/// Number of frames `resample_to_16k` produces for `frames` input frames
pub fn resampled_len(frames: usize, source_rate: u32) -> usize {
    let numerator = frames as u64 * TARGET_SAMPLE_RATE as u64;
    numerator.div_ceil(source_rate as u64) as usize
}

/// Resample mono audio to 16kHz
///
/// The FFT resampler works on fixed chunks and delays its output, so the
/// tail is flushed with silence and the delay is cut from the front. The
/// result always holds `resampled_len(samples.len(), source_rate)` frames.
pub fn resample_to_16k(samples: &[f32], source_rate: u32) -> Result<Vec<f32>> {
    if source_rate == TARGET_SAMPLE_RATE {
        return Ok(samples.to_vec());
    }
    if source_rate == 0 {
        return Err(AppError::InvalidInput("Sample rate must be positive".into()));
    }

    info!(
        "Resampling from {}Hz to {}Hz",
        source_rate, TARGET_SAMPLE_RATE
    );

    let expected = resampled_len(samples.len(), source_rate);

    let mut resampler = FftFixedInOut::<f32>::new(
        source_rate as usize,
        TARGET_SAMPLE_RATE as usize,
        1024,
        1,
    )
    .map_err(|e| AppError::Audio(format!("Failed to create resampler: {}", e)))?;

    let delay = resampler.output_delay();
    let chunk_size = resampler.input_frames_next();
    let mut input_chunk = vec![0.0f32; chunk_size];
    let mut output = Vec::with_capacity(expected + delay + resampler.output_frames_next());
    let mut position = 0;

    while output.len() < expected + delay {
        input_chunk.fill(0.0);
        if position < samples.len() {
            let end = (position + chunk_size).min(samples.len());
            input_chunk[..end - position].copy_from_slice(&samples[position..end]);
        }
        position += chunk_size;

        let result = resampler
            .process(&[input_chunk.as_slice()], None)
            .map_err(|e| AppError::Audio(format!("Resampling failed: {}", e)))?;

        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
    }

    output.drain(..delay);
    output.truncate(expected);

    debug!(
        "Resampled {} frames to {} frames (delay {})",
        samples.len(),
        output.len(),
        delay
    );

    Ok(output)
}

/// Downmix and resample so the waveform satisfies `is_model_ready`
pub fn preprocess(waveform: Waveform) -> Result<Waveform> {
    let mono = downmix_to_mono(waveform);
    if mono.sample_rate == TARGET_SAMPLE_RATE {
        return Ok(mono);
    }

    let resampled = resample_to_16k(&mono.samples, mono.sample_rate)?;
    Ok(Waveform::mono(resampled, TARGET_SAMPLE_RATE))
}

/// Write a waveform as 16-bit PCM WAV
pub fn write_wav(waveform: &Waveform, path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: waveform.channels,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| AppError::Audio(e.to_string()))?;

    for &sample in &waveform.samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer
            .write_sample(value)
            .map_err(|e| AppError::Audio(e.to_string()))?;
    }

    writer
        .finalize()
        .map_err(|e| AppError::Audio(e.to_string()))
}

/// Calculate the duration in milliseconds
pub fn duration_ms(frames: usize, sample_rate: u32) -> i64 {
    if sample_rate == 0 {
        return 0;
    }
    ((frames as f64 / sample_rate as f64) * 1000.0) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn write_pcm16(path: &Path, samples: &[f32], sample_rate: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample((s * 32767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_stereo_8k_upload_becomes_80000_mono_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mix.wav");

        // 5 seconds of 2-channel 8kHz audio, interleaved
        let left = sine(440.0, 8000, 40000);
        let right = sine(660.0, 8000, 40000);
        let interleaved: Vec<f32> = left
            .iter()
            .zip(right.iter())
            .flat_map(|(&l, &r)| [l, r])
            .collect();
        write_pcm16(&path, &interleaved, 8000, 2);

        let decoded = load_audio_file(&path).unwrap();
        assert_eq!(decoded.channels(), 2);
        assert_eq!(decoded.sample_rate(), 8000);
        assert_eq!(decoded.frames(), 40000);

        let ready = preprocess(decoded).unwrap();
        assert_eq!(ready.channels(), 1);
        assert_eq!(ready.sample_rate(), TARGET_SAMPLE_RATE);
        assert_eq!(ready.frames(), 80000);
        assert!(ready.is_model_ready());
    }

    #[test]
    fn test_preprocess_is_identity_for_16k_mono() {
        let samples = sine(300.0, 16000, 16000);
        let waveform = Waveform::mono(samples, 16000);

        let out = preprocess(waveform.clone()).unwrap();
        assert_eq!(out, waveform);
    }

    #[test]
    fn test_preprocess_output_rate_for_common_rates() {
        for rate in [8000u32, 11025, 22050, 44100, 48000] {
            let frames = rate as usize / 2;
            let waveform = Waveform::new(vec![0.1; frames * 2], rate, 2);

            let out = preprocess(waveform).unwrap();
            assert_eq!(out.sample_rate(), 16000, "rate {}", rate);
            assert_eq!(out.channels(), 1, "rate {}", rate);
            assert_eq!(out.frames(), resampled_len(frames, rate), "rate {}", rate);
        }
    }

    #[test]
    fn test_resampling_keeps_tone() {
        // 1kHz tone, 48k -> 16k: same level, ~1000 zero crossings per half second
        let input = sine(1000.0, 48000, 48000);
        let output = resample_to_16k(&input, 48000).unwrap();
        assert_eq!(output.len(), 16000);

        let middle = &output[4000..12000];
        let rms = (middle.iter().map(|s| s * s).sum::<f32>() / middle.len() as f32).sqrt();
        assert!((rms - 0.5 / 2f32.sqrt()).abs() < 0.03, "rms {}", rms);

        let crossings = middle
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count();
        assert!((980..=1020).contains(&crossings), "crossings {}", crossings);
    }

    #[test]
    fn test_downmix_averages_channels() {
        let waveform = Waveform::new(vec![1.0, 0.0, 0.5, -0.5, -1.0, 1.0], 16000, 2);
        let mono = downmix_to_mono(waveform);

        assert_eq!(mono.channels(), 1);
        assert_eq!(mono.samples(), &[0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_decode_float_wav_bytes() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut buffer, spec).unwrap();
            for s in [0.25f32, -0.75, 1.0] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }

        let decoded = decode_wav_bytes(buffer.get_ref()).unwrap();
        assert_eq!(decoded.sample_rate(), 22050);
        assert_eq!(decoded.samples(), &[0.25, -0.75, 1.0]);
    }

    #[test]
    fn test_pcm16_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loud.WAV");
        write_pcm16(&path, &[1.0, -1.0, 0.0], 16000, 1);

        let decoded = load_audio_file(&path).unwrap();
        assert!(decoded.samples().iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!((decoded.samples()[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_garbage_bytes_are_decode_error() {
        let err = decode_wav_bytes(b"definitely not a riff header").unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }

    #[test]
    fn test_non_wav_extension_is_decode_error() {
        let err = load_audio_file(Path::new("/tmp/song.mp3")).unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }

    #[test]
    fn test_write_wav_round_trips_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let waveform = Waveform::mono(sine(200.0, 16000, 1600), 16000);

        write_wav(&waveform, &path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.len(), 1600);
    }
}
