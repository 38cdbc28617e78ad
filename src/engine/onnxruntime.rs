//! ONNX Runtime backend for the ConvTasNet separation network
//!
//! The exported graph takes a `[1, 1, T]` mixture and returns `[1, 2, T']`
//! estimates, where `T'` can differ from `T` by the encoder's padding.

use crate::audio::{Waveform, TARGET_SAMPLE_RATE};
use crate::engine::config::SeparatorConfig;
use crate::engine::{SeparationResult, Separator, NUM_SOURCES};
use crate::error::{AppError, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use parking_lot::Mutex;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// ONNX Runtime separation session (CPU execution provider)
pub struct OnnxSeparator {
    session: Mutex<Session>,
    model_path: PathBuf,
    input_name: String,
    output_name: String,
}

impl OnnxSeparator {
    /// Resolve and load the model
    ///
    /// Every failure on this path is reported as `ModelUnavailable`.
    pub fn load(config: &SeparatorConfig) -> Result<Self> {
        let model_path = config.resolve_model_path()?;
        info!("Loading separation model from {:?}", model_path);

        // commit() returns bool in ort 2.0
        let _ = ort::init().with_name("DuoSplit").commit();

        let session = Session::builder()
            .map_err(|e| AppError::ModelUnavailable(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| AppError::ModelUnavailable(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(config.intra_threads.max(1))
            .map_err(|e| AppError::ModelUnavailable(format!("Failed to set thread count: {}", e)))?
            .commit_from_file(&model_path)
            .map_err(|e| AppError::ModelUnavailable(format!("Failed to load {:?}: {}", model_path, e)))?;

        info!("Separation model loaded");

        Ok(Self {
            session: Mutex::new(session),
            model_path,
            input_name: config.input_name.clone(),
            output_name: config.output_name.clone(),
        })
    }
}

impl Separator for OnnxSeparator {
    fn name(&self) -> &str {
        "ConvTasNet (ONNX Runtime)"
    }

    fn separate(&self, mixture: &Waveform) -> Result<SeparationResult> {
        let frames = mixture.frames();
        debug!("Running {:?} on {} samples", self.model_path.file_name(), frames);

        // mixture: [1, 1, T]
        let input = Tensor::from_array(([1usize, 1usize, frames], mixture.samples().to_vec()))
            .map_err(|e| AppError::Inference(format!("Failed to create mixture tensor: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| AppError::Inference(format!("Separation inference failed: {}", e)))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            AppError::Inference(format!("Model has no output named '{}'", self.output_name))
        })?;

        // sources: [1, 2, T']
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::Inference(format!("Failed to extract sources: {}", e)))?;

        let dims: Vec<i64> = shape.iter().copied().collect();
        debug!("Separation output shape: {:?}", dims);

        let [first, second] = split_sources(&dims, data, frames)?;
        Ok(SeparationResult::new(
            Waveform::mono(first, TARGET_SAMPLE_RATE),
            Waveform::mono(second, TARGET_SAMPLE_RATE),
        ))
    }
}

/// Split a flattened `[1, 2, T']` (or `[2, T']`) estimate into two sources of `frames` samples
///
/// Estimates longer than the mixture are truncated, shorter ones are zero-padded.
pub fn split_sources(shape: &[i64], data: &[f32], frames: usize) -> Result<[Vec<f32>; NUM_SOURCES]> {
    let (num_sources, length) = match shape {
        [1, s, t] | [s, t] => (*s as usize, *t as usize),
        other => {
            return Err(AppError::Inference(format!(
                "Unexpected separation output shape {:?}",
                other
            )))
        }
    };

    if num_sources != NUM_SOURCES {
        return Err(AppError::Inference(format!(
            "Model produced {} sources, expected {}",
            num_sources, NUM_SOURCES
        )));
    }
    if data.len() != num_sources * length {
        return Err(AppError::Inference(format!(
            "Output holds {} values, shape {:?} needs {}",
            data.len(),
            shape,
            num_sources * length
        )));
    }
    if length != frames {
        warn!("Model returned {} samples for {} input samples, fitting", length, frames);
    }

    let fit = |index: usize| {
        let start = index * length;
        let mut source = data[start..start + length.min(frames)].to_vec();
        source.resize(frames, 0.0);
        source
    };

    Ok([fit(0), fit(1)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_exact_length() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let [a, b] = split_sources(&[1, 2, 3], &data, 3).unwrap();
        assert_eq!(a, vec![1.0, 2.0, 3.0]);
        assert_eq!(b, vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_split_truncates_and_pads() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let [a, b] = split_sources(&[1, 2, 4], &data, 3).unwrap();
        assert_eq!(a, vec![1.0, 2.0, 3.0]);
        assert_eq!(b, vec![5.0, 6.0, 7.0]);

        let [a, b] = split_sources(&[2, 4], &data, 6).unwrap();
        assert_eq!(a, vec![1.0, 2.0, 3.0, 4.0, 0.0, 0.0]);
        assert_eq!(b, vec![5.0, 6.0, 7.0, 8.0, 0.0, 0.0]);
    }

    #[test]
    fn test_split_rejects_wrong_source_count() {
        let data = vec![0.0; 9];
        let err = split_sources(&[1, 3, 3], &data, 3).unwrap_err();
        assert!(matches!(err, AppError::Inference(_)));
    }

    #[test]
    fn test_split_rejects_bad_shape() {
        assert!(split_sources(&[6], &[0.0; 6], 3).is_err());
        assert!(split_sources(&[1, 2, 3], &[0.0; 5], 3).is_err());
    }

    #[test]
    fn test_load_without_model_is_unavailable() {
        let config = SeparatorConfig::default().with_model_path("/nonexistent/convtasnet.onnx");
        let err = OnnxSeparator::load(&config).err().unwrap();
        assert!(matches!(err, AppError::ModelUnavailable(_)));
    }
}
