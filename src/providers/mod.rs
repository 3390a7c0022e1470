/*!
 * Provider-agnostic translation client interface.
 *
 * A `TranslationClient` turns an assembled prompt into a raw model
 * response with token accounting. Clients enforce their own minimum
 * request interval and proxy settings but never retry; all retry policy
 * lives in the batch translator.
 */

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::errors::ProviderError;

pub mod claude;
pub mod mock;
pub mod openai;

pub use claude::ClaudeClient;
pub use openai::OpenAIClient;

/// What message shapes a provider supports
#[derive(Debug, Clone, Copy)]
pub struct ClientCapabilities {
    /// Multi-turn conversations are accepted
    pub supports_conversation: bool,
    /// Messages with a system role are accepted
    pub supports_system_messages: bool,
    /// A dedicated system prompt field is accepted
    pub supports_system_prompt: bool,
}

impl Default for ClientCapabilities {
    fn default() -> Self {
        Self {
            supports_conversation: true,
            supports_system_messages: true,
            supports_system_prompt: true,
        }
    }
}

/// One turn in a conversation
#[derive(Debug, Clone)]
pub struct PromptMessage {
    /// "user" or "assistant"
    pub role: String,
    /// Message content
    pub content: String,
}

/// A fully assembled prompt ready to send to a provider
#[derive(Debug, Clone, Default)]
pub struct TranslationPrompt {
    /// Instructions for the system side of the conversation
    pub instructions: String,
    /// The user turn: task statement, context block and batch payload
    pub user_prompt: String,
    /// Preceding conversation turns, for providers that support them
    pub messages: Vec<PromptMessage>,
}

impl TranslationPrompt {
    /// The user content a provider without system prompt support should
    /// send: instructions prepended to the user turn.
    pub fn inline_user_content(&self) -> String {
        if self.instructions.is_empty() {
            self.user_prompt.clone()
        } else {
            format!("{}\n\n{}", self.instructions, self.user_prompt)
        }
    }
}

/// A raw model response with accounting data
#[derive(Debug, Clone)]
pub struct Translation {
    /// The raw response text
    pub text: String,
    /// Prompt tokens consumed, when the provider reports them
    pub prompt_tokens: Option<u64>,
    /// Completion tokens consumed, when the provider reports them
    pub completion_tokens: Option<u64>,
    /// Wall-clock duration of the request
    pub duration: Duration,
    /// Provider name
    pub provider: String,
    /// Model that produced the response
    pub model: Option<String>,
}

impl Translation {
    /// Total tokens consumed, when reported
    pub fn total_tokens(&self) -> Option<u64> {
        match (self.prompt_tokens, self.completion_tokens) {
            (Some(prompt), Some(completion)) => Some(prompt + completion),
            (Some(prompt), None) => Some(prompt),
            (None, Some(completion)) => Some(completion),
            (None, None) => None,
        }
    }
}

/// Provider-agnostic translation client
#[async_trait]
pub trait TranslationClient: Send + Sync {
    /// Provider name used in logs and settings
    fn name(&self) -> &str;

    /// The message shapes this provider supports
    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities::default()
    }

    /// Minimum interval between requests, when the provider is rate limited
    fn rate_limit(&self) -> Option<Duration> {
        None
    }

    /// Send a prompt and return the raw response. Implementations never
    /// retry; they surface typed failures for the batch translator.
    async fn request_translation(
        &self,
        prompt: &TranslationPrompt,
        temperature: Option<f32>,
    ) -> Result<Translation, ProviderError>;
}

/// Minimum-interval gate between outbound requests.
///
/// Each client owns one gate; `wait` sleeps until the configured interval
/// since the previous request has elapsed.
#[derive(Debug)]
pub struct RateGate {
    min_interval: Option<Duration>,
    last_request: Mutex<Option<Instant>>,
}

impl RateGate {
    /// Create a gate; `None` disables the wait entirely
    pub fn new(min_interval: Option<Duration>) -> Self {
        RateGate { min_interval, last_request: Mutex::new(None) }
    }

    /// The configured minimum interval
    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval
    }

    /// Block until a request may be sent, then claim the slot
    pub async fn wait(&self) {
        let Some(min_interval) = self.min_interval else {
            return;
        };

        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < min_interval {
                sleep(min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
