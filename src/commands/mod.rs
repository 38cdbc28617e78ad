pub mod audio;
pub mod separation;

pub use audio::*;
pub use separation::*;

use crate::audio::MicrophoneCapability;
use crate::config::AppConfig;
use crate::pipeline::{PipelineConfig, Session};

/// Everything the commands share; the session serialises runs
pub struct AppState {
    pub config: AppConfig,
    pub pipeline: PipelineConfig,
    pub microphone: MicrophoneCapability,
    pub session: Session,
}

impl AppState {
    pub fn new(config: AppConfig, microphone: MicrophoneCapability) -> Self {
        Self {
            pipeline: config.pipeline_config(),
            config,
            microphone,
            session: Session::new(),
        }
    }
}
