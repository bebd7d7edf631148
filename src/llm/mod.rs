use std::pin::Pin;
use std::time::Duration;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::{PipelineError, Result};

/// One turn of a conversation, in the local model API's wire shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Seam over the local language model serving API.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// One blocking prompt/response round trip.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Streamed chat completion over the full conversation so far.
    async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream>;
}

/// Client for an Ollama-compatible HTTP API.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: ChunkMessage,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize, Default)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

impl OllamaClient {
    pub fn new(config: &ModelConfig) -> std::result::Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            model: config.name.clone(),
        })
    }
}

#[async_trait::async_trait]
impl LanguageModel for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("Sending generate request to model {}", self.model);

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(format!("Model API error: HTTP {}", response.status()).into());
        }

        let body: GenerateResponse = response.json().await?;
        Ok(body.response)
    }

    async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        debug!(
            "Sending chat request to model {} with {} messages",
            self.model,
            messages.len()
        );

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(format!("Model API error: HTTP {}", response.status()).into());
        }

        // The API streams one JSON object per line until a chunk with done=true.
        let stream = try_stream! {
            let mut bytes = response.bytes_stream();
            let mut buf: Vec<u8> = Vec::new();

            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = chunk?;
                buf.extend_from_slice(&chunk);

                while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let parsed: ChatChunk = serde_json::from_str(line)?;
                    if !parsed.message.content.is_empty() {
                        yield parsed.message.content;
                    }
                    if parsed.done {
                        break 'outer;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        let user = ChatMessage::user("hello");
        assert_eq!(user.role, "user");
        assert_eq!(user.content, "hello");

        let assistant = ChatMessage::assistant("hi there");
        assert_eq!(assistant.role, "assistant");
        assert_eq!(assistant.content, "hi there");
    }

    #[test]
    fn test_chat_chunk_parsing() {
        let line = r#"{"model":"gemma3","message":{"role":"assistant","content":"Hel"},"done":false}"#;
        let chunk: ChatChunk = serde_json::from_str(line).unwrap();
        assert_eq!(chunk.message.content, "Hel");
        assert!(!chunk.done);

        // final chunk carries done=true and usually an empty message
        let line = r#"{"model":"gemma3","message":{"role":"assistant","content":""},"done":true}"#;
        let chunk: ChatChunk = serde_json::from_str(line).unwrap();
        assert!(chunk.message.content.is_empty());
        assert!(chunk.done);
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let config = ModelConfig {
            endpoint: "http://localhost:11434/".to_string(),
            name: "gemma3".to_string(),
            request_timeout_secs: 30,
        };
        let client = OllamaClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
    }
}
