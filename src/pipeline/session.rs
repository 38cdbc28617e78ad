use crate::engine::Separator;
use crate::error::{AppError, Result};
use crate::models::{MixtureReady, RunReport};
use crate::pipeline::{AudioInput, Pipeline, PipelineConfig};
use crate::render::RunArtifacts;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Artifacts of the latest run, kept until the next run or an explicit release
///
/// `running` serialises runs. `current` is only locked briefly, so the
/// mixture of a run in progress can be read while separation continues.
#[derive(Default)]
pub struct Session {
    running: Mutex<()>,
    current: Mutex<Option<Arc<RunArtifacts>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn current_run_id(&self) -> Option<String> {
        self.current.lock().as_ref().map(|a| a.run_id().to_string())
    }

    /// Release the previous run, then execute a new one
    ///
    /// The previous artifacts are gone even when the new run fails. The new
    /// run's mixture becomes readable before `on_mixture` is called and
    /// stays readable if separation then fails.
    pub fn run<'s, F, H>(
        &self,
        config: &PipelineConfig,
        input: AudioInput,
        separator: F,
        on_mixture: H,
    ) -> Result<RunReport>
    where
        F: FnOnce() -> Result<&'s dyn Separator>,
        H: FnOnce(&MixtureReady),
    {
        let _running = self.running.lock();
        self.release_current();

        let outcome = Pipeline::new(config).run(input, separator, |artifacts, ready| {
            *self.current.lock() = Some(Arc::clone(artifacts));
            on_mixture(ready);
        })?;
        *self.current.lock() = Some(outcome.artifacts);
        Ok(outcome.report)
    }

    pub fn read_artifact(&self, artifact_id: &str) -> Result<Vec<u8>> {
        let artifacts = self
            .current
            .lock()
            .clone()
            .ok_or_else(|| AppError::InvalidState("No run in this session".into()))?;
        artifacts.read(artifact_id)
    }

    /// Remove the current run's scratch directory, if any
    ///
    /// Refuses while a run is in progress; that run replaces the files anyway.
    pub fn release(&self) -> Result<()> {
        let _running = self
            .running
            .try_lock()
            .ok_or_else(|| AppError::InvalidState("A run is in progress".into()))?;
        self.release_current();
        Ok(())
    }

    fn release_current(&self) {
        let taken = self.current.lock().take();
        if let Some(artifacts) = taken {
            let run_id = artifacts.run_id().to_string();
            match Arc::try_unwrap(artifacts) {
                Ok(artifacts) => match artifacts.close() {
                    Ok(()) => info!("Released run {}", run_id),
                    Err(e) => warn!("Run {} left files behind: {}", run_id, e),
                },
                // A reader still holds it; the last handle removes the dir
                Err(_) => debug!("Run {} released while being read", run_id),
            }
        }
    }
}
