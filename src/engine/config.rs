use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Published identifier of the pretrained network the ONNX file was exported from
pub const MODEL_ID: &str = "JorisCos/ConvTasNet_Libri2Mix_sepclean_16k";

/// File name looked up in the `models/` directories
pub const MODEL_FILE_NAME: &str = "convtasnet_libri2mix_sepclean_16k.onnx";

/// Configuration of the ONNX separation session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeparatorConfig {
    /// Explicit model path; searched for next to the executable when unset
    pub model_path: Option<PathBuf>,
    /// Intra-op threads for the CPU session
    pub intra_threads: usize,
    /// Graph input holding the `[1, 1, T]` mixture
    pub input_name: String,
    /// Graph output holding the `[1, 2, T]` estimates
    pub output_name: String,
}

impl Default for SeparatorConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            intra_threads: 4,
            input_name: "mixture".to_string(),
            output_name: "sources".to_string(),
        }
    }
}

impl SeparatorConfig {
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    /// Find the model file on disk
    pub fn resolve_model_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.model_path {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(AppError::ModelUnavailable(format!(
                "{} (configured path {} does not exist)",
                MODEL_ID,
                path.display()
            )));
        }

        let candidates = model_search_paths();
        for candidate in &candidates {
            debug!("Looking for separation model at {:?}", candidate);
            if candidate.is_file() {
                return Ok(candidate.clone());
            }
        }

        Err(AppError::ModelUnavailable(format!(
            "{} not found; export it to ONNX as {} (searched: {})",
            MODEL_ID,
            MODEL_FILE_NAME,
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}

fn model_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            paths.push(exe_dir.join("models").join(MODEL_FILE_NAME));

            // Development: target/<profile>/duosplit -> crate root
            if let Some(root) = exe_dir.parent().and_then(Path::parent) {
                paths.push(root.join("models").join(MODEL_FILE_NAME));
            }
        }
    }

    paths.push(PathBuf::from("models").join(MODEL_FILE_NAME));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_explicit_model_is_unavailable() {
        let config = SeparatorConfig::default().with_model_path("/nonexistent/model.onnx");
        let err = config.resolve_model_path().unwrap_err();
        assert!(matches!(err, AppError::ModelUnavailable(_)));
    }

    #[test]
    fn test_existing_explicit_model_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.onnx");
        std::fs::write(&path, b"onnx").unwrap();

        let config = SeparatorConfig::default().with_model_path(&path);
        assert_eq!(config.resolve_model_path().unwrap(), path);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: SeparatorConfig = serde_json::from_str(r#"{"intraThreads": 2}"#).unwrap();
        assert_eq!(config.intra_threads, 2);
        assert_eq!(config.input_name, "mixture");
        assert!(config.model_path.is_none());
    }
}
