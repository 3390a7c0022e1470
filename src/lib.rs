/*!
 * # llm-subtrans
 *
 * A library for translating subtitle files (SRT, WebVTT, SSA/ASS) with an
 * LLM provider.
 *
 * The pipeline segments subtitles into scenes and batches, issues
 * structured prompts, parses the model's structured responses back into
 * aligned translated lines, and persists the whole translation as a
 * resumable project.
 *
 * ## Architecture
 *
 * - `formats`: format registry and file handlers (SRT, VTT, SSA/ASS)
 * - `subtitles`: the scene/batch/line tree and its scoped editor
 * - `settings`: typed project settings with legacy-key upgrades
 * - `batcher`: scene and batch segmentation
 * - `preprocessor`: substitutions and text normalisation
 * - `providers`: provider clients (OpenAI, Claude) and test mocks
 * - `translation`: prompt assembly, response parsing, the batch
 *   retry-and-repair state machine and the scene scheduler
 * - `project`: project lifecycle and JSON serialisation
 * - `cli`: the shared command-line surface for the provider binaries
 */

pub mod batcher;
pub mod cli;
pub mod errors;
pub mod formats;
pub mod helpers;
pub mod preprocessor;
pub mod project;
pub mod providers;
pub mod settings;
pub mod subtitles;
pub mod translation;

// Re-export main types for easier usage
pub use batcher::{Batcher, BatcherOptions};
pub use errors::{ProviderError, SubtitleError, TranslationError};
pub use formats::{FormatRegistry, SubtitleData, SubtitleFileHandler};
pub use preprocessor::{Preprocessor, PreprocessorOptions};
pub use project::SubtitleProject;
pub use providers::{Translation, TranslationClient, TranslationPrompt};
pub use settings::ProjectSettings;
pub use subtitles::{SubtitleBatch, SubtitleLine, SubtitleScene, Subtitles};
pub use translation::{SceneTranslator, SceneTranslatorOptions, TranslationEvent, TranslationEvents};
