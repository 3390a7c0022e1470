/*!
 * The translation pipeline core.
 *
 * Submodules:
 * - `instructions`: prompt/instruction defaults and instruction files
 * - `prompt`: prompt assembly for batch requests
 * - `parser`: line-oriented parsing of model responses
 * - `translator`: the per-batch retry-and-repair state machine
 * - `scheduler`: scene iteration, sequential and parallel scheduling
 * - `events`: the typed event bus observers subscribe to
 */

pub mod events;
pub mod instructions;
pub mod parser;
pub mod prompt;
pub mod scheduler;
pub mod translator;

pub use events::{BatchEvent, SceneEvent, TranslationEvent, TranslationEvents};
pub use instructions::{load_instructions, Instructions};
pub use parser::{parse_response, ParsedResponse};
pub use prompt::PromptBuilder;
pub use scheduler::{
    build_prompt_builder, needs_translation, SceneScope, SceneTranslator, SceneTranslatorOptions,
    TranslationScope,
};
pub use translator::{BatchResult, BatchTranslator, TranslatorOptions};
