use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc::Sender;
use tracing::{debug, warn};

use crate::llm::models::{ChatChunk, ChatRequest, StreamEvent, TagsResponse};
use crate::llm::ndjson::LineDecoder;
use crate::llm::{LlmError, LlmProvider};

pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: String) -> Self {
        // Ollama runs locally; requests never go through a system proxy
        let client = Client::builder().no_proxy().build().unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_models(&self) -> Result<Vec<String>, LlmError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("Ollama Error {}: {}", status, text)));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Applies one decoded line. Returns `Ok(true)` once the server marks the reply done.
async fn forward_line(line: &str, tx: &Sender<StreamEvent>) -> Result<bool, LlmError> {
    let chunk: ChatChunk =
        serde_json::from_str(line).map_err(|e| LlmError::InvalidResponse(format!("{}: {}", e, line)))?;

    if let Some(error) = chunk.error {
        return Err(LlmError::Api(error));
    }

    if let Some(message) = chunk.message {
        if !message.content.is_empty() && tx.send(StreamEvent::Fragment(message.content)).await.is_err() {
            debug!("Reply receiver dropped, stopping stream");
            return Ok(true);
        }
    }

    Ok(chunk.done)
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn list_models(&self) -> Vec<String> {
        match self.fetch_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!("Error listing models from {}: {}", self.base_url, e);
                Vec::new()
            }
        }
    }

    async fn chat_streaming(&self, request: &ChatRequest, tx: Sender<StreamEvent>) -> Result<(), LlmError> {
        let body = json!({
            "model": request.model,
            "messages": request.messages,
            "stream": true,
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("Ollama Stream Error {}: {}", status, text)));
        }

        let mut stream = response.bytes_stream();
        let mut decoder = LineDecoder::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| LlmError::Network(e.to_string()))?;
            for line in decoder.push(&bytes) {
                if forward_line(&line, &tx).await? {
                    return Ok(());
                }
            }
        }

        // Connection closed without a `done` marker
        if let Some(line) = decoder.finish() {
            forward_line(&line, &tx).await?;
        }

        Ok(())
    }
}
