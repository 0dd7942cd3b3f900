pub mod models;
pub mod ndjson;
pub mod ollama;

use ollama::OllamaProvider;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, error};

use crate::config::AppConfig;
use models::{ChatRequest, StreamEvent};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Network Error: {0}")]
    Network(String),
    #[error("API Error: {0}")]
    Api(String),
    #[error("Invalid Response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Names of the models the server can run. Failures are logged and
    /// reported as an empty list, which the caller treats as a normal state.
    async fn list_models(&self) -> Vec<String>;

    /// Sends `StreamEvent::Fragment`s to `tx` in the order they arrive and
    /// returns once the reply is complete. Terminal events are added by
    /// [`stream_chat`], never by the provider.
    async fn chat_streaming(&self, request: &ChatRequest, tx: Sender<StreamEvent>) -> Result<(), LlmError>;
}

/// Starts a streamed reply on a background task.
///
/// The receiver yields the reply fragments in receipt order followed by
/// exactly one `Done` or `Error`.
pub fn stream_chat(provider: Arc<dyn LlmProvider>, request: ChatRequest, capacity: usize) -> Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel::<StreamEvent>(capacity.max(1));

    tokio::spawn(async move {
        let terminal = match provider.chat_streaming(&request, tx.clone()).await {
            Ok(()) => StreamEvent::Done,
            Err(e) => {
                error!("LLM Streaming Error ({}): {}", provider.name(), e);
                StreamEvent::Error(e.to_string())
            }
        };
        if tx.send(terminal).await.is_err() {
            debug!("Reply receiver dropped before the stream ended");
        }
    });

    rx
}

pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_default(config: &AppConfig) -> Arc<dyn LlmProvider> {
        Arc::new(OllamaProvider::new(config.ollama.base_url.clone()))
    }
}
