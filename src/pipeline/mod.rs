//! One separation run: ingest, preprocess, separate, denoise, present

pub mod session;

pub use session::Session;

use crate::audio::{decode_wav_bytes, load_audio_file, preprocess, reduce_noise};
use crate::audio::{NoiseReductionConfig, Waveform};
use crate::engine::{separate_sources, Separator};
use crate::error::Result;
use crate::models::{InputSource, InputSummary, MixtureReady, RunReport, SignalLabel};
use crate::render::{present_signal, PlotConfig, RunArtifacts};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Where the mixture comes from
#[derive(Debug, Clone)]
pub enum AudioInput {
    File(PathBuf),
    Bytes { name: String, data: Vec<u8> },
    Microphone { duration_secs: u32 },
}

impl AudioInput {
    fn source(&self) -> InputSource {
        match self {
            AudioInput::File(_) | AudioInput::Bytes { .. } => InputSource::Upload,
            AudioInput::Microphone { .. } => InputSource::Microphone,
        }
    }

    fn name(&self) -> Option<String> {
        match self {
            AudioInput::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            AudioInput::Bytes { name, .. } => Some(name.clone()),
            AudioInput::Microphone { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub noise_reduction: NoiseReductionConfig,
    pub plot: PlotConfig,
    pub scratch_dir: Option<PathBuf>,
}

/// Artifacts of a finished run and the report describing them
pub struct RunOutcome {
    pub artifacts: Arc<RunArtifacts>,
    pub report: RunReport,
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the whole flow on one input
    ///
    /// `on_mixture` gets the run's artifacts as soon as the mixture is on
    /// disk, then `separator` is called. A bad upload therefore never
    /// triggers a model load. On error the artifacts are dropped; the
    /// scratch directory goes with the last `Arc` handle.
    pub fn run<'s, F, H>(&self, input: AudioInput, separator: F, on_mixture: H) -> Result<RunOutcome>
    where
        F: FnOnce() -> Result<&'s dyn Separator>,
        H: FnOnce(&Arc<RunArtifacts>, &MixtureReady),
    {
        let started = Instant::now();
        let artifacts = Arc::new(RunArtifacts::create(self.config.scratch_dir.as_deref())?);
        info!("Run {} started ({:?} input)", artifacts.run_id(), input.source());

        let source = input.source();
        let name = input.name();
        let (raw, recording) = ingest(&artifacts, input)?;
        let (original_sample_rate, original_channels) = (raw.sample_rate(), raw.channels());

        let mixture = preprocess(raw)?;
        let resampled = original_sample_rate != mixture.sample_rate();
        if resampled {
            warn!(
                "Input was {}Hz, resampled to {}Hz",
                original_sample_rate,
                mixture.sample_rate()
            );
        }

        let mixture_report = present_signal(&artifacts, SignalLabel::Mixture, &mixture, &self.config.plot);
        on_mixture(
            &artifacts,
            &MixtureReady {
                run_id: artifacts.run_id().to_string(),
                recording: recording.clone(),
                mixture: mixture_report.clone(),
            },
        );

        let separator = separator()?;
        let separated = separate_sources(separator, &mixture)?;

        let mut sources = Vec::with_capacity(SignalLabel::SOURCES.len());
        for (label, estimate) in SignalLabel::SOURCES.into_iter().zip(separated.into_sources()) {
            let cleaned = reduce_noise(estimate.samples(), estimate.sample_rate(), &self.config.noise_reduction)?;
            let cleaned = Waveform::mono(cleaned, estimate.sample_rate());
            sources.push(present_signal(&artifacts, label, &cleaned, &self.config.plot));
        }

        let elapsed_ms = started.elapsed().as_millis() as i64;
        info!("Run {} finished in {} ms", artifacts.run_id(), elapsed_ms);

        let report = RunReport {
            run_id: artifacts.run_id().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            separator: separator.name().to_string(),
            input: InputSummary {
                source,
                name,
                original_sample_rate,
                original_channels,
                resampled,
                duration_ms: mixture.duration_ms(),
            },
            recording,
            mixture: mixture_report,
            sources,
            elapsed_ms,
        };

        Ok(RunOutcome { artifacts, report })
    }
}

/// Decoded input, plus the artifact id of the capture for microphone runs
fn ingest(artifacts: &RunArtifacts, input: AudioInput) -> Result<(Waveform, Option<String>)> {
    match input {
        AudioInput::File(path) => {
            info!("Loading {:?}", path);
            Ok((load_audio_file(&path)?, None))
        }
        AudioInput::Bytes { name, data } => {
            info!("Decoding upload {} ({} bytes)", name, data.len());
            Ok((decode_wav_bytes(&data)?, None))
        }
        AudioInput::Microphone { duration_secs } => {
            let (clip, recording) = record(artifacts, duration_secs)?;
            Ok((clip, Some(recording)))
        }
    }
}

#[cfg(feature = "microphone")]
fn record(artifacts: &RunArtifacts, duration_secs: u32) -> Result<(Waveform, String)> {
    let clip = crate::audio::record_clip(duration_secs)?;
    stage_recording(artifacts, &clip)
}

#[cfg(not(feature = "microphone"))]
fn record(_artifacts: &RunArtifacts, duration_secs: u32) -> Result<(Waveform, String)> {
    crate::audio::validate_duration(duration_secs)?;
    Err(crate::error::AppError::Audio("Built without microphone support".into()))
}

/// Write a recording to the run directory and read it back like an upload
pub fn stage_recording(artifacts: &RunArtifacts, clip: &Waveform) -> Result<(Waveform, String)> {
    let recording = artifacts.write_recording(clip)?;
    let staged = load_audio_file(&artifacts.path_of(&recording)?)?;
    Ok((staged, recording))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engine::SeparationResult;
    use crate::error::AppError;
    use crate::models::ArtifactStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the mixture scaled down, counting calls
    #[derive(Default)]
    pub(crate) struct CountingSeparator {
        pub calls: AtomicUsize,
        pub poison_second: bool,
    }

    impl Separator for CountingSeparator {
        fn name(&self) -> &str {
            "counting"
        }

        fn separate(&self, mixture: &Waveform) -> Result<SeparationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let first = mixture.samples().iter().map(|s| s * 0.5).collect();
            let second = if self.poison_second {
                vec![f32::NAN; mixture.frames()]
            } else {
                mixture.samples().iter().map(|s| s * -0.5).collect()
            };
            Ok(SeparationResult::new(
                Waveform::mono(first, 16000),
                Waveform::mono(second, 16000),
            ))
        }
    }

    pub(crate) fn wav_bytes(sample_rate: u32, channels: u16, seconds: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let frames = (sample_rate as f32 * seconds) as usize;
            for i in 0..frames {
                let t = i as f32 / sample_rate as f32;
                let value = (2.0 * std::f32::consts::PI * 300.0 * t).sin() * 0.3
                    + (2.0 * std::f32::consts::PI * 1100.0 * t).sin() * 0.2;
                for _ in 0..channels {
                    writer.write_sample((value * 32767.0) as i16).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn upload(data: Vec<u8>) -> AudioInput {
        AudioInput::Bytes {
            name: "mix.wav".into(),
            data,
        }
    }

    #[test]
    fn test_decode_error_never_reaches_separator() {
        let config = PipelineConfig::default();
        let fake = CountingSeparator::default();
        let mut provider_calls = 0;

        let mut hook_calls = 0;

        let result = Pipeline::new(&config).run(
            upload(b"not a wav".to_vec()),
            || {
                provider_calls += 1;
                Ok(&fake as &dyn Separator)
            },
            |_, _| hook_calls += 1,
        );

        assert!(matches!(result, Err(AppError::Decode(_))));
        assert_eq!(provider_calls, 0);
        assert_eq!(hook_calls, 0);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_full_run_produces_three_signals() {
        let config = PipelineConfig::default();
        let fake = CountingSeparator::default();

        let outcome = Pipeline::new(&config)
            .run(upload(wav_bytes(8000, 2, 1.0)), || Ok(&fake as &dyn Separator), |_, _| {})
            .unwrap();
        let report = &outcome.report;

        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.separator, "counting");
        assert_eq!(report.input.original_sample_rate, 8000);
        assert_eq!(report.input.original_channels, 2);
        assert!(report.input.resampled);
        assert_eq!(report.input.name.as_deref(), Some("mix.wav"));
        assert_eq!(report.mixture.frames, 16000);
        assert_eq!(report.sources.len(), 2);

        for signal in std::iter::once(&report.mixture).chain(report.sources.iter()) {
            assert_eq!(signal.sample_rate, 16000);
            assert_eq!(signal.frames, 16000);
            for status in [&signal.audio, &signal.waveform, &signal.spectrogram] {
                let id = status.artifact_id().unwrap();
                assert!(id.starts_with(&report.run_id));
                assert!(outcome.artifacts.read(id).is_ok());
            }
        }
    }

    #[test]
    fn test_model_unavailable_aborts_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            scratch_dir: Some(root.path().to_path_buf()),
            ..PipelineConfig::default()
        };

        let result = Pipeline::new(&config).run(
            upload(wav_bytes(16000, 1, 0.5)),
            || Err(AppError::ModelUnavailable("missing".into())),
            |_, _| {},
        );

        assert!(matches!(result, Err(AppError::ModelUnavailable(_))));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_render_failure_is_per_plot() {
        let config = PipelineConfig::default();
        let fake = CountingSeparator {
            poison_second: true,
            ..CountingSeparator::default()
        };

        let outcome = Pipeline::new(&config)
            .run(upload(wav_bytes(16000, 1, 0.5)), || Ok(&fake as &dyn Separator), |_, _| {})
            .unwrap();
        let report = &outcome.report;

        assert!(!report.input.resampled);
        assert!(report.mixture.waveform.artifact_id().is_some());
        assert!(report.sources[0].spectrogram.artifact_id().is_some());
        assert!(matches!(report.sources[1].waveform, ArtifactStatus::Failed { .. }));
        assert!(matches!(report.sources[1].spectrogram, ArtifactStatus::Failed { .. }));
        assert!(report.sources[1].audio.artifact_id().is_some());
    }

    #[test]
    fn test_mixture_published_before_model_load() {
        let config = PipelineConfig::default();
        let fake = CountingSeparator::default();
        let order = std::cell::RefCell::new(Vec::new());
        let mut published: Option<(Arc<RunArtifacts>, MixtureReady)> = None;

        let outcome = Pipeline::new(&config)
            .run(
                upload(wav_bytes(16000, 1, 0.5)),
                || {
                    order.borrow_mut().push("separator");
                    Ok(&fake as &dyn Separator)
                },
                |artifacts, ready| {
                    order.borrow_mut().push("mixture");
                    published = Some((Arc::clone(artifacts), ready.clone()));
                },
            )
            .unwrap();

        assert_eq!(*order.borrow(), ["mixture", "separator"]);
        let (artifacts, ready) = published.unwrap();
        assert_eq!(ready.run_id, outcome.report.run_id);
        assert_eq!(ready.recording, None);
        assert_eq!(ready.mixture.frames, outcome.report.mixture.frames);
        let audio = ready.mixture.audio.artifact_id().unwrap();
        assert_eq!(&artifacts.read(audio).unwrap()[..4], b"RIFF");
    }

    #[test]
    fn test_published_mixture_survives_failed_separation() {
        let config = PipelineConfig::default();
        let mut published = None;

        let result = Pipeline::new(&config).run(
            upload(wav_bytes(16000, 1, 0.5)),
            || Err(AppError::ModelUnavailable("missing".into())),
            |artifacts, ready| published = Some((Arc::clone(artifacts), ready.clone())),
        );

        assert!(matches!(result, Err(AppError::ModelUnavailable(_))));
        let (artifacts, ready) = published.unwrap();
        for status in [&ready.mixture.audio, &ready.mixture.waveform, &ready.mixture.spectrogram] {
            assert!(artifacts.read(status.artifact_id().unwrap()).is_ok());
        }
    }

    #[test]
    fn test_staged_recording_decodes_like_upload() {
        let artifacts = RunArtifacts::create(None).unwrap();
        let clip = Waveform::new(vec![0.25; 44100 * 2], 44100, 2);

        let (staged, recording) = stage_recording(&artifacts, &clip).unwrap();
        assert_eq!(staged.sample_rate(), 44100);
        assert_eq!(staged.channels(), 2);
        assert_eq!(staged.frames(), 44100);
        assert_eq!(recording, format!("{}-recording.wav", artifacts.run_id()));
        assert_eq!(&artifacts.read(&recording).unwrap()[..4], b"RIFF");
        assert_eq!(artifacts.list().unwrap(), vec![recording]);
    }

    #[cfg(not(feature = "microphone"))]
    #[test]
    fn test_microphone_without_support_is_audio_error() {
        let config = PipelineConfig::default();
        let fake = CountingSeparator::default();
        let result = Pipeline::new(&config).run(
            AudioInput::Microphone { duration_secs: 3 },
            || Ok(&fake as &dyn Separator),
            |_, _| {},
        );
        assert!(matches!(result, Err(AppError::Audio(_))));

        let result = Pipeline::new(&config).run(
            AudioInput::Microphone { duration_secs: 30 },
            || Ok(&fake as &dyn Separator),
            |_, _| {},
        );
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }
}
