use crate::config::OpenAiConfig;
use crate::types::{ChatMessage, GenerationFailure, GenerationRequest, GenerationResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A remote text-generation endpoint.
///
/// Implementations are shared across pool workers and detached invoker
/// tasks, so they must be usable concurrently.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, request: &GenerationRequest) -> GenerationResult;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(cfg: &OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .context("failed to build openai http client")?;
        Ok(Self {
            client,
            api_key: cfg.api_key.clone(),
            api_url: cfg.api_url.clone(),
            model: cfg.model.clone(),
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn complete(&self, request: &GenerationRequest) -> GenerationResult {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationFailure::Remote {
                status: Some(status.as_u16()),
                message: text,
            });
        }

        let data: ChatCompletionResponse =
            response.json().await.map_err(|err| GenerationFailure::Remote {
                status: None,
                message: format!("failed to parse response: {err}"),
            })?;

        data.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| GenerationFailure::Remote {
                status: None,
                message: "no choices returned in response".to_string(),
            })
    }
}

fn classify_transport(err: reqwest::Error) -> GenerationFailure {
    if err.is_timeout() {
        GenerationFailure::Transport(format!("request timed out: {err}"))
    } else if err.is_connect() {
        GenerationFailure::Transport(format!("connection failed: {err}"))
    } else {
        GenerationFailure::Transport(err.to_string())
    }
}
