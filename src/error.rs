use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Input is not audio the WAV decoder understands
    #[error("Could not decode audio: {0}")]
    Decode(String),

    /// Separation model could not be found or loaded
    #[error("Separation model unavailable: {0}")]
    ModelUnavailable(String),

    /// A plot or playback artifact could not be produced
    #[error("Rendering failed: {0}")]
    Render(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Separation failed: {0}")]
    Inference(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Short machine-readable tag used by the page to pick a message style
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Decode(_) => "decode",
            AppError::ModelUnavailable(_) => "modelUnavailable",
            AppError::Render(_) => "render",
            AppError::Audio(_) => "audio",
            AppError::Inference(_) => "inference",
            AppError::InvalidInput(_) => "invalidInput",
            AppError::InvalidState(_) => "invalidState",
            AppError::NotFound(_) => "notFound",
            AppError::Io(_) => "io",
        }
    }
}

// Tauri commands return errors to the webview as JSON
impl Serialize for AppError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
