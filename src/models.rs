use crate::audio::capture::{
    MicrophoneCapability, DEFAULT_RECORD_SECS, MAX_RECORD_SECS, MIN_RECORD_SECS,
};
use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// The three signals shown on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalLabel {
    Mixture,
    Source1,
    Source2,
}

impl SignalLabel {
    pub const SOURCES: [SignalLabel; 2] = [SignalLabel::Source1, SignalLabel::Source2];

    /// Used in artifact file names
    pub fn slug(&self) -> &'static str {
        match self {
            SignalLabel::Mixture => "mixture",
            SignalLabel::Source1 => "source1",
            SignalLabel::Source2 => "source2",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            SignalLabel::Mixture => "Mixture",
            SignalLabel::Source1 => "Source 1",
            SignalLabel::Source2 => "Source 2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputSource {
    Upload,
    Microphone,
}

/// What the page may offer, built from the capability detected at startup
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputOptions {
    pub sources: Vec<InputSource>,
    pub microphone: MicrophoneCapability,
    pub min_record_secs: u32,
    pub max_record_secs: u32,
    pub default_record_secs: u32,
}

impl InputOptions {
    pub fn new(microphone: &MicrophoneCapability, default_record_secs: u32) -> Self {
        let mut sources = vec![InputSource::Upload];
        if microphone.is_available() {
            sources.push(InputSource::Microphone);
        }

        Self {
            sources,
            microphone: microphone.clone(),
            min_record_secs: MIN_RECORD_SECS,
            max_record_secs: MAX_RECORD_SECS,
            default_record_secs: default_record_secs.clamp(MIN_RECORD_SECS, MAX_RECORD_SECS),
        }
    }
}

impl Default for InputOptions {
    fn default() -> Self {
        Self::new(
            &MicrophoneCapability::Unavailable {
                reason: "Not detected".to_string(),
            },
            DEFAULT_RECORD_SECS,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ArtifactStatus {
    #[serde(rename_all = "camelCase")]
    Ready { artifact_id: String },
    Failed { message: String },
}

impl ArtifactStatus {
    pub fn from_result(result: Result<String, AppError>) -> Self {
        match result {
            Ok(artifact_id) => ArtifactStatus::Ready { artifact_id },
            Err(e) => ArtifactStatus::Failed {
                message: e.to_string(),
            },
        }
    }

    pub fn artifact_id(&self) -> Option<&str> {
        match self {
            ArtifactStatus::Ready { artifact_id } => Some(artifact_id),
            ArtifactStatus::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalReport {
    pub label: SignalLabel,
    pub title: String,
    pub frames: usize,
    pub sample_rate: u32,
    pub duration_ms: i64,
    pub audio: ArtifactStatus,
    pub waveform: ArtifactStatus,
    pub spectrogram: ArtifactStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSummary {
    pub source: InputSource,
    pub name: Option<String>,
    pub original_sample_rate: u32,
    pub original_channels: u16,
    pub resampled: bool,
    pub duration_ms: i64,
}

/// Sent as soon as the preprocessed mixture is on disk, before separation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixtureReady {
    pub run_id: String,
    /// Artifact id of the raw microphone capture
    pub recording: Option<String>,
    pub mixture: SignalReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub created_at: String,
    pub separator: String,
    pub input: InputSummary,
    pub recording: Option<String>,
    pub mixture: SignalReport,
    pub sources: Vec<SignalReport>,
    pub elapsed_ms: i64,
}
