use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;

use super::{ClientCapabilities, RateGate, Translation, TranslationClient, TranslationPrompt};

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default completion budget
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Client for the OpenAI chat completions API. Also serves any
/// OpenAI-compatible endpoint when constructed with a custom base URL.
#[derive(Debug)]
pub struct OpenAIClient {
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

/// Chat completions request
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    max_tokens: u32,
}

/// One chat message
#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl OpenAIClient {
    /// Create a new client for the public OpenAI API
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_config(api_key, "https://api.openai.com/v1", model, None, None, None)
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
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }

    fn build_messages(&self, prompt: &TranslationPrompt) -> Vec<ChatMessage> {
        let mut messages = Vec::new();

        if !prompt.instructions.is_empty() {
            messages.push(ChatMessage { role: "system".to_string(), content: prompt.instructions.clone() });
        }

        for turn in &prompt.messages {
            messages.push(ChatMessage { role: turn.role.clone(), content: turn.content.clone() });
        }

        messages.push(ChatMessage { role: "user".to_string(), content: prompt.user_prompt.clone() });
        messages
    }
}

#[async_trait]
impl TranslationClient for OpenAIClient {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            supports_conversation: true,
            supports_system_messages: true,
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

        let request = ChatRequest {
            model: self.model.clone(),
            messages: self.build_messages(prompt),
            temperature,
            max_tokens: self.max_tokens,
        };

        let start = Instant::now();
        let response = self
            .client
            .post(self.api_url())
            .bearer_auth(&self.api_key)
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

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("Response contained no choices".to_string()))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(ProviderError::Refused("Response stopped by content filter".to_string()));
        }

        debug!("OpenAI response received in {:?}", start.elapsed());

        Ok(Translation {
            text: choice.message.content,
            prompt_tokens: parsed.usage.as_ref().map(|usage| usage.prompt_tokens),
            completion_tokens: parsed.usage.as_ref().map(|usage| usage.completion_tokens),
            duration: start.elapsed(),
            provider: self.name().to_string(),
            model: parsed.model.or_else(|| Some(self.model.clone())),
        })
    }
}

/// Build a reqwest client with timeout and optional proxy
pub(crate) fn build_http_client(
    proxy: Option<&str>,
    timeout: Option<Duration>,
) -> Result<Client, ProviderError> {
    let timeout = timeout.unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    let mut builder = Client::builder().timeout(timeout);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ProviderError::RequestFailed(format!("Invalid proxy URL: {}", e)))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ProviderError::RequestFailed(format!("Failed to build HTTP client: {}", e)))
}

/// Map a transport error to a typed provider error
pub(crate) fn map_request_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(error.to_string())
    } else if error.is_connect() {
        ProviderError::ConnectionError(error.to_string())
    } else {
        ProviderError::RequestFailed(error.to_string())
    }
}

/// Map an HTTP error status to a typed provider error
pub(crate) fn map_status_error(status_code: u16, message: String) -> ProviderError {
    match status_code {
        401 | 403 => ProviderError::AuthenticationError(message),
        402 => ProviderError::QuotaExceeded(message),
        429 => {
            if message.contains("insufficient_quota") || message.contains("billing") {
                ProviderError::QuotaExceeded(message)
            } else {
                ProviderError::RateLimitExceeded(message)
            }
        }
        _ => ProviderError::ApiError { status_code, message },
    }
}
