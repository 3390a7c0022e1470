use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;

use super::openai::{build_http_client, map_request_error, map_status_error};
use super::{ClientCapabilities, RateGate, Translation, TranslationClient, TranslationPrompt};

/// Default completion budget
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Client for the Claude messages API
#[derive(Debug)]
pub struct ClaudeClient {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API endpoint base URL
    endpoint: String,
    /// Model to request
    model: String,
    /// Maximum tokens to generate
    max_tokens: u32,
    /// Minimum-interval gate between requests
    gate: RateGate,
}

/// Messages API request
#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    max_tokens: u32,
}

/// One conversation message
#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

impl ClaudeClient {
    /// Create a new client for the public API
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_config(api_key, "https://api.anthropic.com", model, None, None, None)
    }

    /// Create a client with a custom endpoint, rate limit, proxy and
    /// request timeout
    pub fn with_config(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        rate_limit: Option<Duration>,
        proxy: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self, ProviderError> {
        let client = build_http_client(proxy, timeout)?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            gate: RateGate::new(rate_limit),
        })
    }

    fn api_url(&self) -> String {
        format!("{}/v1/messages", self.endpoint.trim_end_matches('/'))
    }

    fn build_messages(&self, prompt: &TranslationPrompt) -> Vec<Message> {
        let mut messages = Vec::new();

        for turn in &prompt.messages {
            messages.push(Message { role: turn.role.clone(), content: turn.content.clone() });
        }

        messages.push(Message { role: "user".to_string(), content: prompt.user_prompt.clone() });
        messages
    }
}

#[async_trait]
impl TranslationClient for ClaudeClient {
    fn name(&self) -> &str {
        "Claude"
    }

    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            supports_conversation: true,
            supports_system_messages: false,
            supports_system_prompt: true,
        }
    }

    fn rate_limit(&self) -> Option<Duration> {
        self.gate.min_interval()
    }

    async fn request_translation(
        &self,
        prompt: &TranslationPrompt,
        temperature: Option<f32>,
    ) -> Result<Translation, ProviderError> {
        self.gate.wait().await;

        let system = if prompt.instructions.is_empty() { None } else { Some(prompt.instructions.clone()) };
        let request = MessagesRequest {
            model: self.model.clone(),
            messages: self.build_messages(prompt),
            system,
            temperature,
            max_tokens: self.max_tokens,
        };

        let start = Instant::now();
        let response = self
            .client
            .post(self.api_url())
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            return Err(map_status_error(status.as_u16(), error_text));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        if parsed.stop_reason.as_deref() == Some("refusal") {
            return Err(ProviderError::Refused("Model declined to respond".to_string()));
        }

        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text.as_str())
            .collect();

        debug!("Claude response received in {:?}", start.elapsed());

        Ok(Translation {
            text,
            prompt_tokens: Some(parsed.usage.input_tokens),
            completion_tokens: Some(parsed.usage.output_tokens),
            duration: start.elapsed(),
            provider: self.name().to_string(),
            model: parsed.model.or_else(|| Some(self.model.clone())),
        })
    }
}
