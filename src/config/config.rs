use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Used when the server reports no models.
    #[serde(default = "default_model")]
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// How many leading words of the first message become the session title.
    #[serde(default = "default_title_words")]
    pub title_words: usize,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DictationConfig {
    #[serde(default = "default_whisper_binary")]
    pub binary_path: String,
    #[serde(default = "default_whisper_model")]
    pub model_path: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default)]
    pub audio_dir: Option<String>,
}

impl DictationConfig {
    pub fn audio_dir(&self) -> PathBuf {
        self.audio_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub dictation: DictationConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("OCHAT").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Expand environment variables if present like ${OLLAMA_HOST}
        app_config.database.path = expand_env(&app_config.database.path);
        app_config.ollama.base_url = expand_env(&app_config.ollama.base_url);
        app_config.dictation.binary_path = expand_env(&app_config.dictation.binary_path);
        app_config.dictation.model_path = expand_env(&app_config.dictation.model_path);
        if let Some(dir) = app_config.dictation.audio_dir.as_mut() {
            *dir = expand_env(dir);
        }

        Ok(app_config)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_model: default_model(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            title_words: default_title_words(),
            system_prompt: None,
            stream_buffer: default_stream_buffer(),
        }
    }
}

impl Default for DictationConfig {
    fn default() -> Self {
        Self {
            binary_path: default_whisper_binary(),
            model_path: default_whisper_model(),
            language: default_language(),
            threads: default_threads(),
            audio_dir: None,
        }
    }
}

fn default_database_path() -> String {
    "chat.db".to_string()
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3".to_string()
}

fn default_title_words() -> usize {
    5
}

fn default_stream_buffer() -> usize {
    100
}

fn default_whisper_binary() -> String {
    "whisper-cli".to_string()
}

fn default_whisper_model() -> String {
    "models/ggml-base.bin".to_string()
}

fn default_language() -> String {
    "auto".to_string()
}

fn default_threads() -> usize {
    4
}

fn expand_env(val: &str) -> String {
    if val.starts_with("${") && val.ends_with('}') {
        let var_name = &val[2..val.len() - 1];
        std::env::var(var_name).unwrap_or_default()
    } else {
        val.to_string()
    }
}
