//! Remote technique analysis over an OpenAI-compatible chat-completions API
//!
//! One request per session: the fixed prompt followed by the selected frames
//! as inline JPEG data URLs. The reply is returned verbatim.

use crate::image::EncodedFrame;
use crate::prompt::ACTION_PROMPT;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-2024-11-20";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Response contained no message content")]
    EmptyResponse,
}

/// Anything that turns frames into free-text feedback.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, frames: &[EncodedFrame]) -> Result<String, AnalysisError>;
}

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    config: AnalysisConfig,
    client: Client,
}

impl OpenAiClient {
    pub fn new(config: AnalysisConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    /// Reuse an existing connection pool.
    pub fn with_client(config: AnalysisConfig, client: Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Request body: one user message, prompt text then one image part per frame.
    pub fn build_request_body(&self, frames: &[EncodedFrame]) -> Value {
        let mut content = Vec::with_capacity(frames.len() + 1);
        content.push(json!({ "type": "text", "text": ACTION_PROMPT }));
        content.extend(frames.iter().map(|frame| {
            json!({
                "type": "image_url",
                "image_url": { "url": frame.data_url() }
            })
        }));

        json!({
            "model": self.config.model,
            "messages": [
                { "role": "user", "content": content }
            ],
            "max_tokens": self.config.max_tokens
        })
    }
}

#[async_trait]
impl Analyzer for OpenAiClient {
    async fn analyze(&self, frames: &[EncodedFrame]) -> Result<String, AnalysisError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(AnalysisError::MissingApiKey)?;

        let body = self.build_request_body(frames);
        info!(
            "Requesting analysis from {} with {} frames",
            self.config.model,
            frames.len()
        );
        debug!("POST {}", self.endpoint());

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Analysis API error {}: {}", status, body);
            return Err(AnalysisError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(AnalysisError::EmptyResponse)?;

        if choice.finish_reason.as_deref() == Some("length") {
            warn!("Analysis truncated at max_tokens={}", self.config.max_tokens);
        }

        choice.message.content.ok_or(AnalysisError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: &str) -> EncodedFrame {
        EncodedFrame {
            base64: tag.to_string(),
        }
    }

    #[test]
    fn test_request_body_layout() {
        let client = OpenAiClient::new(AnalysisConfig::default());
        let body = client.build_request_body(&[frame("AAA"), frame("BBB")]);

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], 4096);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");

        let content = messages[0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[0]["text"], ACTION_PROMPT);
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,AAA");
        assert_eq!(content[2]["image_url"]["url"], "data:image/jpeg;base64,BBB");
    }

    #[test]
    fn test_request_body_without_frames() {
        let client = OpenAiClient::new(AnalysisConfig::default());
        let body = client.build_request_body(&[]);
        let content = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["type"], "text");
    }

    #[test]
    fn test_endpoint_trailing_slash() {
        let client = OpenAiClient::new(AnalysisConfig {
            base_url: "http://localhost:9000/v1/".to_string(),
            ..Default::default()
        });
        assert_eq!(client.endpoint(), "http://localhost:9000/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = OpenAiClient::new(AnalysisConfig::default());
        let err = client.analyze(&[]).await.unwrap_err();
        assert!(matches!(err, AnalysisError::MissingApiKey));

        let client = OpenAiClient::new(AnalysisConfig {
            api_key: Some(String::new()),
            ..Default::default()
        });
        assert!(matches!(client.analyze(&[]).await, Err(AnalysisError::MissingApiKey)));
    }
}
