//! Per-run scratch directory holding playable audio and plot images

use crate::audio::{write_wav, Waveform};
use crate::error::{AppError, Result};
use crate::models::SignalLabel;
use crate::render::plot::encode_png;
use image::RgbImage;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Audio,
    Waveform,
    Spectrogram,
}

impl ArtifactKind {
    fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => "audio.wav",
            ArtifactKind::Waveform => "waveform.png",
            ArtifactKind::Spectrogram => "spectrogram.png",
        }
    }
}

/// Files of one pipeline run
///
/// The directory is named `duosplit-<run id>-XXXX` and every file inside
/// starts with the run id, so artifacts of different runs never collide.
/// Dropping the value removes the directory.
pub struct RunArtifacts {
    run_id: String,
    dir: TempDir,
}

impl RunArtifacts {
    /// Create the scratch directory under `root`, or the system temp dir
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let run_id = Uuid::new_v4().to_string();
        let prefix = format!("duosplit-{}-", run_id);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        debug!("Run {} scratch dir: {:?}", run_id, dir.path());
        Ok(Self { run_id, dir })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    fn file_name(&self, label: SignalLabel, kind: ArtifactKind) -> String {
        format!("{}-{}-{}", self.run_id, label.slug(), kind.suffix())
    }

    /// Write the raw microphone capture and return its artifact id
    pub fn write_recording(&self, clip: &Waveform) -> Result<String> {
        let name = format!("{}-recording.wav", self.run_id);
        write_wav(clip, &self.dir.path().join(&name))
            .map_err(|e| AppError::Audio(format!("Could not stage recording: {}", e)))?;
        Ok(name)
    }

    /// Write a 16-bit WAV and return its artifact id
    pub fn write_audio(&self, label: SignalLabel, waveform: &Waveform) -> Result<String> {
        let name = self.file_name(label, ArtifactKind::Audio);
        write_wav(waveform, &self.dir.path().join(&name))
            .map_err(|e| AppError::Render(format!("Could not write {}: {}", name, e)))?;
        Ok(name)
    }

    /// Encode a plot as PNG and return its artifact id
    pub fn write_image(&self, label: SignalLabel, kind: ArtifactKind, img: &RgbImage) -> Result<String> {
        let name = self.file_name(label, kind);
        let bytes = encode_png(img)?;
        std::fs::write(self.dir.path().join(&name), bytes)
            .map_err(|e| AppError::Render(format!("Could not write {}: {}", name, e)))?;
        Ok(name)
    }

    /// Resolve an artifact id to a file of this run
    pub fn path_of(&self, artifact_id: &str) -> Result<PathBuf> {
        let is_plain_name = !artifact_id.is_empty()
            && !artifact_id.contains(['/', '\\'])
            && artifact_id != "."
            && artifact_id != "..";
        if !is_plain_name || !artifact_id.starts_with(&self.run_id) {
            return Err(AppError::NotFound(format!(
                "Artifact {} does not belong to run {}",
                artifact_id, self.run_id
            )));
        }

        let path = self.dir.path().join(artifact_id);
        if !path.is_file() {
            return Err(AppError::NotFound(format!("Artifact {}", artifact_id)));
        }
        Ok(path)
    }

    pub fn read(&self, artifact_id: &str) -> Result<Vec<u8>> {
        let path = self.path_of(artifact_id)?;
        Ok(std::fs::read(path)?)
    }

    /// Artifact ids currently on disk, sorted
    #[cfg(test)]
    pub(crate) fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.dir.path())? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove the directory now, reporting failures instead of ignoring them
    pub fn close(self) -> Result<()> {
        let run_id = self.run_id;
        self.dir.close().map_err(|e| {
            warn!("Failed to remove scratch dir of run {}: {}", run_id, e);
            AppError::Io(e)
        })
    }
}
