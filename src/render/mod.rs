pub mod artifacts;
pub mod plot;

pub use artifacts::{ArtifactKind, RunArtifacts};
pub use plot::{encode_png, render_spectrogram, render_waveform, PlotConfig};

use crate::audio::Waveform;
use crate::models::{ArtifactStatus, SignalLabel, SignalReport};
use tracing::{debug, warn};

/// Write the playable audio and both plots of one signal
///
/// Each artifact fails on its own; a failure is recorded in the report
/// and never stops the other artifacts from being produced.
pub fn present_signal(
    artifacts: &RunArtifacts,
    label: SignalLabel,
    waveform: &Waveform,
    config: &PlotConfig,
) -> SignalReport {
    let audio = ArtifactStatus::from_result(artifacts.write_audio(label, waveform));

    let waveform_plot = ArtifactStatus::from_result(
        render_waveform(waveform.samples(), config)
            .and_then(|img| artifacts.write_image(label, ArtifactKind::Waveform, &img)),
    );

    let spectrogram_plot = ArtifactStatus::from_result(
        render_spectrogram(waveform.samples(), config)
            .and_then(|img| artifacts.write_image(label, ArtifactKind::Spectrogram, &img)),
    );

    for (what, status) in [
        ("audio", &audio),
        ("waveform", &waveform_plot),
        ("spectrogram", &spectrogram_plot),
    ] {
        if let ArtifactStatus::Failed { message } = status {
            warn!("{} {} failed: {}", label.title(), what, message);
        }
    }
    debug!("Presented {}", label.title());

    SignalReport {
        label,
        title: label.title().to_string(),
        frames: waveform.frames(),
        sample_rate: waveform.sample_rate(),
        duration_ms: waveform.duration_ms(),
        audio,
        waveform: waveform_plot,
        spectrogram: spectrogram_plot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_artifacts_ready_for_normal_signal() {
        let artifacts = RunArtifacts::create(None).unwrap();
        let samples = (0..16000).map(|i| (i as f32 * 0.07).sin() * 0.3).collect();
        let report = present_signal(
            &artifacts,
            SignalLabel::Mixture,
            &Waveform::mono(samples, 16000),
            &PlotConfig::default(),
        );

        assert_eq!(report.frames, 16000);
        assert_eq!(report.duration_ms, 1000);
        for status in [&report.audio, &report.waveform, &report.spectrogram] {
            let id = status.artifact_id().unwrap();
            assert!(artifacts.read(id).is_ok());
        }
    }

    #[test]
    fn test_plot_failure_keeps_audio() {
        let artifacts = RunArtifacts::create(None).unwrap();
        let mut samples = vec![0.1f32; 1000];
        samples[10] = f32::INFINITY;
        let report = present_signal(
            &artifacts,
            SignalLabel::Source2,
            &Waveform::mono(samples, 16000),
            &PlotConfig::default(),
        );

        assert!(report.audio.artifact_id().is_some());
        assert!(matches!(report.waveform, ArtifactStatus::Failed { .. }));
        assert!(matches!(report.spectrogram, ArtifactStatus::Failed { .. }));
    }
}
