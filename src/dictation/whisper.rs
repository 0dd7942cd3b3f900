use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::config::DictationConfig;
use crate::dictation::{discard_audio, ModelLoader, SpeechModel, TranscriptionError};

/// Runs a whisper.cpp command line binary once per recording.
#[derive(Debug, Clone)]
pub struct WhisperCliModel {
    pub binary_path: PathBuf,
    pub model_path: PathBuf,
    pub language: String,
    pub threads: usize,
}

impl WhisperCliModel {
    pub fn command_args(&self, audio_file: &Path, output_prefix: &Path) -> Vec<String> {
        vec![
            "-m".to_string(),
            self.model_path.to_string_lossy().to_string(),
            "-f".to_string(),
            audio_file.to_string_lossy().to_string(),
            "-l".to_string(),
            self.language.clone(),
            "-t".to_string(),
            self.threads.max(1).to_string(),
            "-np".to_string(),
            "--no-timestamps".to_string(),
            "-otxt".to_string(),
            "-of".to_string(),
            output_prefix.to_string_lossy().to_string(),
        ]
    }
}

impl SpeechModel for WhisperCliModel {
    fn transcribe(&self, audio: &Path) -> Result<String, TranscriptionError> {
        let output_prefix = std::env::temp_dir().join(format!("ochat-{}-out", Uuid::new_v4().simple()));
        let txt_path = output_prefix.with_extension("txt");

        let output = Command::new(&self.binary_path)
            .args(self.command_args(audio, &output_prefix))
            .output()
            .map_err(|e| {
                TranscriptionError::Engine(format!(
                    "failed to execute '{}': {}",
                    self.binary_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            discard_audio(&txt_path);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscriptionError::Engine(format!(
                "whisper exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let transcript = if txt_path.exists() {
            let text = fs::read_to_string(&txt_path)
                .map_err(|e| TranscriptionError::Engine(format!("failed to read transcription output: {}", e)));
            discard_audio(&txt_path);
            text?
        } else {
            String::from_utf8_lossy(&output.stdout).to_string()
        };

        Ok(transcript.trim().to_string())
    }

    fn label(&self) -> String {
        self.model_path.to_string_lossy().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct WhisperCliLoader {
    pub model: WhisperCliModel,
}

impl WhisperCliLoader {
    pub fn from_config(config: &DictationConfig) -> Self {
        Self {
            model: WhisperCliModel {
                binary_path: PathBuf::from(&config.binary_path),
                model_path: PathBuf::from(&config.model_path),
                language: config.language.clone(),
                threads: config.threads,
            },
        }
    }
}

impl ModelLoader for WhisperCliLoader {
    fn load(&self) -> Result<Arc<dyn SpeechModel>, TranscriptionError> {
        info!("Loading Whisper model '{}'...", self.model.model_path.display());

        if !self.model.model_path.is_file() {
            return Err(TranscriptionError::ModelLoad(format!(
                "model file '{}' does not exist",
                self.model.model_path.display()
            )));
        }

        // A bare command name is looked up on PATH at run time
        let binary = &self.model.binary_path;
        if binary.components().count() > 1 && !binary.is_file() {
            return Err(TranscriptionError::ModelLoad(format!(
                "whisper binary '{}' does not exist",
                binary.display()
            )));
        }

        Ok(Arc::new(self.model.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> WhisperCliModel {
        WhisperCliModel {
            binary_path: PathBuf::from("whisper-cli"),
            model_path: PathBuf::from("/models/ggml-base.bin"),
            language: "en".to_string(),
            threads: 0,
        }
    }

    #[test]
    fn command_args_name_model_input_and_output() {
        let args = model().command_args(Path::new("/tmp/in.wav"), Path::new("/tmp/out"));
        assert_eq!(&args[..6], ["-m", "/models/ggml-base.bin", "-f", "/tmp/in.wav", "-l", "en"]);
        assert_eq!(&args[6..8], ["-t", "1"]);
        assert!(args.contains(&"--no-timestamps".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out"));
    }

    #[test]
    fn loading_requires_the_model_file() {
        let loader = WhisperCliLoader { model: model() };
        match loader.load() {
            Err(TranscriptionError::ModelLoad(msg)) => assert!(msg.contains("ggml-base.bin")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("load should fail without a model file"),
        }
    }

    #[test]
    fn loading_succeeds_with_model_file_and_path_binary() {
        let model_file = tempfile::NamedTempFile::new().unwrap();
        let mut model = model();
        model.model_path = model_file.path().to_path_buf();

        let loaded = WhisperCliLoader { model }.load().unwrap();
        assert_eq!(loaded.label(), model_file.path().to_string_lossy());
    }
}
