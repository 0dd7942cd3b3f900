pub mod whisper;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::DictationConfig;
pub use whisper::{WhisperCliLoader, WhisperCliModel};

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("Audio file not found: {}", .0.display())]
    MissingAudio(PathBuf),
    #[error("Failed to load speech model: {0}")]
    ModelLoad(String),
    #[error("Transcription failed: {0}")]
    Engine(String),
    #[error("Transcription worker failed: {0}")]
    Worker(String),
}

/// A loaded speech-to-text model.
pub trait SpeechModel: Send + Sync {
    fn transcribe(&self, audio: &Path) -> Result<String, TranscriptionError>;

    fn label(&self) -> String {
        "unknown".to_string()
    }
}

/// Produces the model on first use. Loading may be slow.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn SpeechModel>, TranscriptionError>;
}

/// Shared, lazily loaded speech model.
///
/// The first caller pays the load; concurrent first callers wait on the same
/// lock so the loader runs at most once and everyone gets the same handle.
/// Transcriptions are serialised.
pub struct DictationService {
    loader: Box<dyn ModelLoader>,
    model: Mutex<Option<Arc<dyn SpeechModel>>>,
    inference: Mutex<()>,
}

impl DictationService {
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            model: Mutex::new(None),
            inference: Mutex::new(()),
        }
    }

    pub fn from_config(config: &DictationConfig) -> Self {
        Self::new(WhisperCliLoader::from_config(config))
    }

    pub fn is_loaded(&self) -> bool {
        self.model.lock().map(|m| m.is_some()).unwrap_or(false)
    }

    pub fn handle(&self) -> Result<Arc<dyn SpeechModel>, TranscriptionError> {
        let mut slot = self
            .model
            .lock()
            .map_err(|_| TranscriptionError::ModelLoad("model lock poisoned".to_string()))?;

        if let Some(model) = slot.as_ref() {
            return Ok(model.clone());
        }

        // A failed load leaves the slot empty so the next caller retries
        let model = self.loader.load()?;
        info!("Speech model loaded: {}", model.label());
        *slot = Some(model.clone());
        Ok(model)
    }

    /// Blocking. Run it off the interactive task.
    pub fn transcribe(&self, audio: &Path) -> Result<String, TranscriptionError> {
        if !audio.exists() {
            return Err(TranscriptionError::MissingAudio(audio.to_path_buf()));
        }

        let model = self.handle()?;
        let _guard = self
            .inference
            .lock()
            .map_err(|_| TranscriptionError::Engine("inference lock poisoned".to_string()))?;

        debug!("Transcribing {}", audio.display());
        model.transcribe(audio)
    }
}

/// A fresh, collision-free path for the next recording.
pub fn recording_path(dir: &Path) -> PathBuf {
    dir.join(format!("input_{}.wav", Uuid::new_v4().simple()))
}

/// Best-effort removal of a finished recording.
pub fn discard_audio(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        debug!("Could not remove {}: {}", path.display(), e);
    }
}
