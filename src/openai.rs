//! Direct OpenAI client for doctor replies and script extraction.
//!
//! This module provides a client that connects directly to OpenAI's Chat Completions API.
//! Users provide their own OpenAI API key.

use crate::config::OpenAiSettings;
use crate::error::ResponseError;
use crate::gateway::{CompletionGateway, CompletionParams};
use crate::prompt::ChatMessage;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};
use zeroize::Zeroize;

/// Client for direct OpenAI Chat Completions API calls.
pub struct OpenAIClient {
    api_key: String,
    api_url: String,
    model: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

/// Request body for OpenAI Chat Completions API.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

/// Response from OpenAI Chat Completions API.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

/// Choice in the response.
#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

/// Response message content.
#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAIClient {
    /// Create a new OpenAI client from settings and an API key.
    pub fn new(settings: &OpenAiSettings, api_key: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()
            .context("Failed to create HTTP client for OpenAIClient")?;

        Ok(Self {
            api_key: api_key.to_string(),
            api_url: settings.api_url.to_string(),
            model: settings.model.clone(),
            timeout_secs: settings.timeout_secs,
            client,
        })
    }

    /// Extract text from the OpenAI response structure.
    fn extract_text(response: ChatCompletionResponse) -> Result<String, ResponseError> {
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                ResponseError::InvalidResponse("No text content in OpenAI response".into())
            })
    }
}

#[async_trait]
impl CompletionGateway for OpenAIClient {
    /// Send one Chat Completions request. Failures are returned as-is, never retried.
    #[instrument(skip(self, messages), fields(model = %self.model, message_count = messages.len()))]
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: CompletionParams,
    ) -> Result<String, ResponseError> {
        let request_body = ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ResponseError::Timeout(self.timeout_secs)
                } else {
                    ResponseError::Network(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            warn!(status = status, "OpenAI request rejected");
            return Err(ResponseError::ServerError { status, message });
        }

        let chat_response: ChatCompletionResponse = response.json().await.map_err(|e| {
            ResponseError::InvalidResponse(format!("Failed to parse OpenAI response: {}", e))
        })?;

        let text = Self::extract_text(chat_response)?;
        info!(reply_len = text.len(), "OpenAI completion received");
        Ok(text)
    }
}

impl Drop for OpenAIClient {
    fn drop(&mut self) {
        // Clear API key from memory
        self.api_key.zeroize();
    }
}
