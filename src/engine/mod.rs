pub mod config;
pub mod onnxruntime;

use crate::audio::{Waveform, TARGET_SAMPLE_RATE};
use crate::error::{AppError, Result};
use once_cell::sync::OnceCell;
use tracing::{debug, info};

pub use config::{SeparatorConfig, MODEL_FILE_NAME, MODEL_ID};
pub use onnxruntime::OnnxSeparator;

/// The network always estimates exactly this many speakers
pub const NUM_SOURCES: usize = 2;

/// Two estimated sources, in whatever order the network emitted them
#[derive(Debug, Clone)]
pub struct SeparationResult {
    sources: [Waveform; NUM_SOURCES],
}

impl SeparationResult {
    pub fn new(first: Waveform, second: Waveform) -> Self {
        Self {
            sources: [first, second],
        }
    }

    pub fn sources(&self) -> &[Waveform; NUM_SOURCES] {
        &self.sources
    }

    pub fn into_sources(self) -> [Waveform; NUM_SOURCES] {
        self.sources
    }
}

/// Two-speaker separation backend
///
/// Implementations receive a mono 16kHz mixture and must return two
/// sources of the same length. Parameters are never mutated by `separate`.
pub trait Separator: Send + Sync {
    /// Engine name for logging
    fn name(&self) -> &str;

    /// Run the network on a validated mixture
    fn separate(&self, mixture: &Waveform) -> Result<SeparationResult>;
}

/// Check the input invariant, run the separator, then check its output
pub fn separate_sources(separator: &dyn Separator, mixture: &Waveform) -> Result<SeparationResult> {
    if !mixture.is_model_ready() {
        return Err(AppError::InvalidInput(format!(
            "Separation needs non-empty mono {}Hz audio, got {} frames of {} channels at {}Hz",
            TARGET_SAMPLE_RATE,
            mixture.frames(),
            mixture.channels(),
            mixture.sample_rate()
        )));
    }

    info!(
        "Separating {} samples ({} ms) with {}",
        mixture.frames(),
        mixture.duration_ms(),
        separator.name()
    );

    let result = separator.separate(mixture)?;

    for (index, source) in result.sources().iter().enumerate() {
        if source.frames() != mixture.frames()
            || source.channels() != 1
            || source.sample_rate() != TARGET_SAMPLE_RATE
        {
            return Err(AppError::Inference(format!(
                "Source {} has {} frames at {}Hz, expected {} at {}Hz",
                index + 1,
                source.frames(),
                source.sample_rate(),
                mixture.frames(),
                TARGET_SAMPLE_RATE
            )));
        }
    }

    debug!("Separation produced {} sources", NUM_SOURCES);
    Ok(result)
}

static SEPARATOR: OnceCell<OnnxSeparator> = OnceCell::new();

/// Process-wide separation session, loaded on first use
///
/// A failed load leaves the cell empty, so the next interaction tries again.
pub fn shared_separator(config: &SeparatorConfig) -> Result<&'static OnnxSeparator> {
    SEPARATOR.get_or_try_init(|| {
        info!("Loading separation model {}", MODEL_ID);
        OnnxSeparator::load(config)
    })
}
