/*!
 * Mock translation clients for testing.
 *
 * The loopback client echoes each original line back as its translation in
 * the expected response shape, so the whole pipeline can run without a
 * provider. Scripted behaviours simulate misaligned responses, transient
 * failures and fatal provider errors.
 */

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::ProviderError;

use super::{ClientCapabilities, Translation, TranslationClient, TranslationPrompt};

/// Behaviour of the loopback client
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehaviour {
    /// Echo every original as its translation
    Echo,
    /// Drop the final translation on the first attempt for each payload,
    /// then respond completely on the retry
    DropLastOnFirstAttempt,
    /// Fail the nth request (1-based) with an authentication error
    FailAuthOnRequest(usize),
    /// Fail the first n requests with a 503, then echo
    TransientFailures(usize),
    /// Always fail with a server error
    Failing,
}

/// A client that answers prompts locally by echoing the originals
#[derive(Debug)]
pub struct LoopbackClient {
    behaviour: MockBehaviour,
    /// Request counter shared across clones
    request_count: Arc<AtomicUsize>,
    /// Payload keys already seen, for first-attempt behaviours
    seen_payloads: Arc<Mutex<HashSet<String>>>,
    /// Reported rate limit, to exercise scheduler gating
    rate_limit: Option<Duration>,
}

impl LoopbackClient {
    /// Create a loopback client with the given behaviour
    pub fn new(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            request_count: Arc::new(AtomicUsize::new(0)),
            seen_payloads: Arc::new(Mutex::new(HashSet::new())),
            rate_limit: None,
        }
    }

    /// A client that always echoes
    pub fn echo() -> Self {
        Self::new(MockBehaviour::Echo)
    }

    /// A client that misaligns the first attempt for each batch
    pub fn misaligned_once() -> Self {
        Self::new(MockBehaviour::DropLastOnFirstAttempt)
    }

    /// A client that fails the nth request with an auth error
    pub fn auth_failure_on(request: usize) -> Self {
        Self::new(MockBehaviour::FailAuthOnRequest(request))
    }

    /// A client that reports a rate limit
    pub fn with_rate_limit(mut self, min_interval: Duration) -> Self {
        self.rate_limit = Some(min_interval);
        self
    }

    /// Number of requests made so far
    pub fn requests_made(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    fn echo_response(&self, prompt: &TranslationPrompt, drop_last: bool) -> String {
        let stanzas = parse_prompt_payload(&prompt.user_prompt);
        let keep = if drop_last && !stanzas.is_empty() { stanzas.len() - 1 } else { stanzas.len() };

        let mut response = String::new();
        for (number, text) in stanzas.iter().take(keep) {
            response.push_str(&format!("#{}\nOriginal>\n{}\nTranslation>\n{}\n\n", number, text, text));
        }
        response.push_str("<summary>Loopback translation</summary>\n");
        response.push_str("<scene>Loopback scene</scene>\n");
        response
    }
}

impl Clone for LoopbackClient {
    fn clone(&self) -> Self {
        Self {
            behaviour: self.behaviour,
            request_count: Arc::clone(&self.request_count),
            seen_payloads: Arc::clone(&self.seen_payloads),
            rate_limit: self.rate_limit,
        }
    }
}

#[async_trait]
impl TranslationClient for LoopbackClient {
    fn name(&self) -> &str {
        "Loopback"
    }

    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities::default()
    }

    fn rate_limit(&self) -> Option<Duration> {
        self.rate_limit
    }

    async fn request_translation(
        &self,
        prompt: &TranslationPrompt,
        _temperature: Option<f32>,
    ) -> Result<Translation, ProviderError> {
        let request_number = self.request_count.fetch_add(1, Ordering::SeqCst) + 1;

        let text = match self.behaviour {
            MockBehaviour::Echo => self.echo_response(prompt, false),

            MockBehaviour::DropLastOnFirstAttempt => {
                let key = payload_key(&prompt.user_prompt);
                let first_attempt = self.seen_payloads.lock().insert(key);
                self.echo_response(prompt, first_attempt)
            }

            MockBehaviour::FailAuthOnRequest(n) => {
                if request_number == n {
                    return Err(ProviderError::AuthenticationError("invalid api key".to_string()));
                }
                self.echo_response(prompt, false)
            }

            MockBehaviour::TransientFailures(n) => {
                if request_number <= n {
                    return Err(ProviderError::ApiError {
                        status_code: 503,
                        message: format!("simulated transient failure #{}", request_number),
                    });
                }
                self.echo_response(prompt, false)
            }

            MockBehaviour::Failing => {
                return Err(ProviderError::ApiError {
                    status_code: 500,
                    message: "simulated provider failure".to_string(),
                });
            }
        };

        Ok(Translation {
            prompt_tokens: Some(prompt.user_prompt.len() as u64 / 4),
            completion_tokens: Some(text.len() as u64 / 4),
            duration: Duration::from_millis(1),
            provider: self.name().to_string(),
            model: Some("loopback".to_string()),
            text,
        })
    }
}

/// Identify a payload by its line numbers, so retries of the same batch
/// can be recognised
fn payload_key(user_prompt: &str) -> String {
    parse_prompt_payload(user_prompt)
        .iter()
        .map(|(number, _)| number.to_string())
        .collect::<Vec<String>>()
        .join(",")
}

/// Extract `(line number, original text)` stanzas from a prompt payload
pub fn parse_prompt_payload(user_prompt: &str) -> Vec<(usize, String)> {
    let mut stanzas = Vec::new();
    let mut current_number: Option<usize> = None;
    let mut capturing = false;
    let mut text_lines: Vec<&str> = Vec::new();

    for line in user_prompt.lines() {
        let trimmed = line.trim();

        if let Some(number) = trimmed.strip_prefix('#').and_then(|rest| rest.parse::<usize>().ok()) {
            current_number = Some(number);
            capturing = false;
            text_lines.clear();
            continue;
        }

        if trimmed == "Original>" {
            capturing = true;
            text_lines.clear();
            continue;
        }

        if trimmed == "Translation>" {
            if let Some(number) = current_number.take() {
                stanzas.push((number, text_lines.join("\n")));
            }
            capturing = false;
            continue;
        }

        if capturing {
            text_lines.push(line);
        }
    }

    stanzas
}
