/*!
 * Batch translation.
 *
 * Each batch is driven through a small state machine:
 *
 * ```text
 *   Pending ──build_prompt──▶ Requesting
 *   Requesting ──ok──▶ Parsing
 *   Requesting ──transient──▶ Retrying(k)
 *   Requesting ──fatal──▶ Failed
 *   Parsing ──aligned──▶ PostProcessing
 *   Parsing ──misaligned & k<max──▶ Retrying(k, repair)
 *   Parsing ──misaligned & k=max──▶ Failed
 *   PostProcessing ──▶ Translated
 *   Retrying(k) ──build_prompt(with repair)──▶ Requesting
 * ```
 *
 * Transient provider errors retry with exponential backoff; misaligned
 * responses retry with repair instructions and a fresh prompt. Fatal
 * provider errors are terminal. The abort flag is checked at every
 * suspension point.
 */

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::sleep;

use crate::errors::{ProviderError, TranslationError};
use crate::helpers;
use crate::providers::{Translation, TranslationClient};
use crate::subtitles::{BatchContext, SubtitleLine};

use super::events::{TranslationEvent, TranslationEvents};
use super::parser::{parse_response, ParsedResponse};
use super::prompt::PromptBuilder;

/// Options controlling retries and post-processing
#[derive(Debug, Clone)]
pub struct TranslatorOptions {
    /// Repair retry cycles permitted per batch
    pub max_retries: u32,
    /// Transient error retries permitted per request
    pub max_retries_transient: u32,
    /// Initial backoff for transient retries, doubled each time
    pub backoff: Duration,
    /// Sampling temperature passed to the provider
    pub temperature: Option<f32>,
    /// Wrap predominantly right-to-left translations in RTL markers
    pub add_rtl_markers: bool,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        Self {
            max_retries: 2,
            max_retries_transient: 3,
            backoff: Duration::from_millis(1000),
            temperature: None,
            add_rtl_markers: false,
        }
    }
}

/// The outcome of translating one batch
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Accepted translations keyed by line number
    pub translations: BTreeMap<usize, String>,
    /// Content of the `<summary>` tag from the final response
    pub summary: Option<String>,
    /// Content of the `<scene>` tag from the final response
    pub scene_summary: Option<String>,
    /// Raw text of the final response
    pub raw_response: String,
    /// Problems encountered along the way (validation errors from earlier
    /// attempts and warnings from the final one)
    pub errors: Vec<String>,
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Total prompt tokens across attempts
    pub prompt_tokens: Option<u64>,
    /// Total completion tokens across attempts
    pub completion_tokens: Option<u64>,
}

/// Translates one batch at a time against a provider client
#[derive(Clone)]
pub struct BatchTranslator {
    client: Arc<dyn TranslationClient>,
    prompt_builder: PromptBuilder,
    options: TranslatorOptions,
    events: Arc<TranslationEvents>,
    abort: Arc<AtomicBool>,
}

enum BatchState {
    Pending,
    Requesting {
        attempt: u32,
        transient_retries: u32,
        repair: Option<Vec<String>>,
    },
    Parsing {
        attempt: u32,
        response: Translation,
        repair: Option<Vec<String>>,
    },
    PostProcessing {
        attempt: u32,
        parsed: ParsedResponse,
        accepted: BTreeMap<usize, String>,
        raw: String,
    },
    RetryingTransient {
        attempt: u32,
        transient_retries: u32,
        repair: Option<Vec<String>>,
        error: ProviderError,
    },
    RetryingRepair {
        attempt: u32,
        errors: Vec<String>,
    },
    Translated(BatchResult),
    Failed(TranslationError),
}

impl BatchTranslator {
    /// Create a batch translator
    pub fn new(
        client: Arc<dyn TranslationClient>,
        prompt_builder: PromptBuilder,
        options: TranslatorOptions,
        events: Arc<TranslationEvents>,
        abort: Arc<AtomicBool>,
    ) -> Self {
        Self { client, prompt_builder, options, events, abort }
    }

    /// Whether an abort has been requested
    pub fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Drive the state machine for one batch
    pub async fn translate_batch(
        &self,
        originals: &[SubtitleLine],
        context: &BatchContext,
    ) -> Result<BatchResult, TranslationError> {
        let mut state = BatchState::Pending;
        let mut accumulated_errors: Vec<String> = Vec::new();
        let mut prompt_tokens: Option<u64> = None;
        let mut completion_tokens: Option<u64> = None;

        loop {
            state = match state {
                BatchState::Pending => {
                    BatchState::Requesting { attempt: 1, transient_retries: 0, repair: None }
                }

                BatchState::Requesting { attempt, transient_retries, repair } => {
                    if self.aborted() {
                        return Err(TranslationError::Aborted);
                    }

                    let prompt = self.prompt_builder.build_prompt(originals, context, repair.as_deref());
                    debug!(
                        "Requesting translation of {} lines (attempt {})",
                        originals.len(),
                        attempt
                    );

                    match self.client.request_translation(&prompt, self.options.temperature).await {
                        Ok(response) => {
                            add_tokens(&mut prompt_tokens, response.prompt_tokens);
                            add_tokens(&mut completion_tokens, response.completion_tokens);
                            BatchState::Parsing { attempt, response, repair }
                        }
                        Err(error) if error.is_transient()
                            && transient_retries < self.options.max_retries_transient =>
                        {
                            BatchState::RetryingTransient { attempt, transient_retries, repair, error }
                        }
                        Err(error) => BatchState::Failed(TranslationError::Provider(error)),
                    }
                }

                BatchState::Parsing { attempt, response, repair: _ } => {
                    if self.aborted() {
                        return Err(TranslationError::Aborted);
                    }

                    let parsed = parse_response(&response.text);
                    let validation = validate_alignment(originals, &parsed);

                    for warning in &validation.warnings {
                        self.events.emit(TranslationEvent::Warning(warning.clone()));
                    }
                    accumulated_errors.extend(validation.warnings.iter().cloned());

                    if validation.errors.is_empty() {
                        BatchState::PostProcessing {
                            attempt,
                            parsed,
                            accepted: validation.accepted,
                            raw: response.text,
                        }
                    } else {
                        accumulated_errors.extend(validation.errors.iter().cloned());
                        if attempt <= self.options.max_retries {
                            BatchState::RetryingRepair { attempt, errors: validation.errors }
                        } else {
                            BatchState::Failed(TranslationError::Misaligned {
                                attempts: attempt,
                                errors: validation.errors,
                            })
                        }
                    }
                }

                BatchState::RetryingTransient { attempt, transient_retries, repair, error } => {
                    let backoff = self.options.backoff * 2u32.pow(transient_retries);
                    warn!("Transient provider error, retrying in {:?}: {}", backoff, error);
                    sleep(backoff).await;

                    if self.aborted() {
                        return Err(TranslationError::Aborted);
                    }

                    BatchState::Requesting { attempt, transient_retries: transient_retries + 1, repair }
                }

                BatchState::RetryingRepair { attempt, errors } => {
                    self.events.emit(TranslationEvent::Warning(format!(
                        "Translation attempt {} misaligned ({}), retrying with repair instructions",
                        attempt,
                        errors.join("; ")
                    )));

                    BatchState::Requesting {
                        attempt: attempt + 1,
                        transient_retries: 0,
                        repair: Some(errors),
                    }
                }

                BatchState::PostProcessing { attempt, parsed, accepted, raw } => {
                    let translations = self.post_process(accepted);

                    BatchState::Translated(BatchResult {
                        translations,
                        summary: parsed.summary,
                        scene_summary: parsed.scene_summary,
                        raw_response: raw,
                        errors: accumulated_errors.clone(),
                        attempts: attempt,
                        prompt_tokens,
                        completion_tokens,
                    })
                }

                BatchState::Translated(result) => return Ok(result),
                BatchState::Failed(error) => return Err(error),
            };
        }
    }

    /// Normalise accepted translations: RTL markers are added when the
    /// file asks for them. Soft-break sentinels stay internal; the format
    /// handler restores them on compose.
    fn post_process(&self, accepted: BTreeMap<usize, String>) -> BTreeMap<usize, String> {
        accepted
            .into_iter()
            .map(|(number, text)| {
                let text = if self.options.add_rtl_markers && helpers::is_right_to_left(&text) {
                    helpers::add_rtl_markers(&text)
                } else {
                    text
                };
                (number, text)
            })
            .collect()
    }
}

struct ValidationOutcome {
    /// Translations accepted for application, keyed by line number
    accepted: BTreeMap<usize, String>,
    /// Misalignment problems that force a retry
    errors: Vec<String>,
    /// Problems worth recording but not retrying over
    warnings: Vec<String>,
}

/// Enforce the alignment rules: every original translated non-empty, no
/// duplicates, strays dropped with a warning, break-count differences
/// noted as warnings.
fn validate_alignment(originals: &[SubtitleLine], parsed: &ParsedResponse) -> ValidationOutcome {
    let mut accepted = BTreeMap::new();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for original in originals {
        match parsed.translations.get(&original.number) {
            Some(translation) if !translation.trim().is_empty() => {
                let (original_hard, original_soft) = helpers::count_breaks(&original.text);
                let (translated_hard, translated_soft) = helpers::count_breaks(translation);
                if original_hard != translated_hard || original_soft != translated_soft {
                    warnings.push(format!("Line breaks differ for line #{}", original.number));
                }
                accepted.insert(original.number, translation.clone());
            }
            Some(_) => errors.push(format!("Translation for line #{} is empty", original.number)),
            None => errors.push(format!("No translation for line #{}", original.number)),
        }
    }

    for number in &parsed.duplicates {
        errors.push(format!("Duplicate translation blocks for line #{}", number));
    }

    for number in parsed.translations.keys() {
        if !originals.iter().any(|original| original.number == *number) {
            warnings.push(format!("Dropped stray translation for unknown line #{}", number));
        }
    }

    ValidationOutcome { accepted, errors, warnings }
}

fn add_tokens(total: &mut Option<u64>, delta: Option<u64>) {
    if let Some(delta) = delta {
        *total = Some(total.unwrap_or(0) + delta);
    }
}
