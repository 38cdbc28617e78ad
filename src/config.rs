//! Application configuration
//!
//! Resolution order, last wins:
//! 1. Compiled defaults
//! 2. JSON file named by `DUOSPLIT_CONFIG`
//! 3. `DUOSPLIT_MODEL` and `DUOSPLIT_SCRATCH_DIR`

use crate::audio::capture::DEFAULT_RECORD_SECS;
use crate::audio::NoiseReductionConfig;
use crate::engine::SeparatorConfig;
use crate::error::{AppError, Result};
use crate::pipeline::PipelineConfig;
use crate::render::PlotConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const CONFIG_ENV: &str = "DUOSPLIT_CONFIG";
pub const MODEL_ENV: &str = "DUOSPLIT_MODEL";
pub const SCRATCH_ENV: &str = "DUOSPLIT_SCRATCH_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub separator: SeparatorConfig,
    pub noise_reduction: NoiseReductionConfig,
    pub plot: PlotConfig,
    /// Parent of the per-run scratch directories; system temp dir when unset
    pub scratch_dir: Option<PathBuf>,
    /// `EnvFilter` directives used when `RUST_LOG` is not set
    pub log_filter: String,
    /// Log file path; `<temp>/duosplit.log` when unset
    pub log_file: Option<PathBuf>,
    pub default_record_secs: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            separator: SeparatorConfig::default(),
            noise_reduction: NoiseReductionConfig::default(),
            plot: PlotConfig::default(),
            scratch_dir: None,
            log_filter: "duosplit=debug,info".to_string(),
            log_file: None,
            default_record_secs: DEFAULT_RECORD_SECS,
        }
    }
}

impl AppConfig {
    /// Load from the environment
    ///
    /// A config file that cannot be read falls back to defaults; the error
    /// is returned so it can be logged once logging is up.
    pub fn load() -> (Self, Option<AppError>) {
        let (base, problem) = match std::env::var_os(CONFIG_ENV).map(PathBuf::from) {
            Some(path) => match Self::from_file(&path) {
                Ok(config) => (config, None),
                Err(e) => (Self::default(), Some(e)),
            },
            None => (Self::default(), None),
        };

        let config = base.with_overrides(
            std::env::var_os(MODEL_ENV).map(PathBuf::from),
            std::env::var_os(SCRATCH_ENV).map(PathBuf::from),
        );
        (config, problem)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| AppError::InvalidInput(format!("Invalid config {:?}: {}", path, e)))
    }

    pub fn with_overrides(mut self, model: Option<PathBuf>, scratch_dir: Option<PathBuf>) -> Self {
        if let Some(model) = model {
            self.separator.model_path = Some(model);
        }
        if let Some(dir) = scratch_dir {
            self.scratch_dir = Some(dir);
        }
        self
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("duosplit.log"))
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            noise_reduction: self.noise_reduction.clone(),
            plot: self.plot.clone(),
            scratch_dir: self.scratch_dir.clone(),
        }
    }

    pub fn log_summary(&self) {
        info!(
            "Config: model={:?}, threads={}, scratch={:?}, noise mode={:?}",
            self.separator.model_path,
            self.separator.intra_threads,
            self.scratch_dir,
            self.noise_reduction.mode
        );
    }
}
