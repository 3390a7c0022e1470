/*!
 * Prompt assembly for batch translation requests.
 *
 * The user turn carries the task statement, a context block (names,
 * description, rolling history of batch summaries) and the batch payload
 * as one stanza per line. Repair attempts extend the system instructions
 * with the retry instructions and the problems found.
 */

use crate::providers::TranslationPrompt;
use crate::subtitles::{BatchContext, SubtitleLine};

use super::instructions::Instructions;

/// Builds prompts from tag-expanded instructions
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    instructions: Instructions,
}

impl PromptBuilder {
    /// Create a builder; the instructions should already have their tags
    /// expanded for the current settings
    pub fn new(instructions: Instructions) -> Self {
        PromptBuilder { instructions }
    }

    /// The instructions driving this builder
    pub fn instructions(&self) -> &Instructions {
        &self.instructions
    }

    /// Build the prompt for a batch. `repair_errors` carries the problems
    /// from a misaligned attempt; when present the retry instructions and
    /// the error list are appended to the system instructions.
    pub fn build_prompt(
        &self,
        lines: &[SubtitleLine],
        context: &BatchContext,
        repair_errors: Option<&[String]>,
    ) -> TranslationPrompt {
        let mut user_prompt = String::new();

        user_prompt.push_str(&self.instructions.prompt);
        user_prompt.push_str("\n\n");

        let context_block = format_context(context);
        if !context_block.is_empty() {
            user_prompt.push_str(&context_block);
            user_prompt.push_str("\n\n");
        }

        user_prompt.push_str(&format_payload(lines));

        TranslationPrompt {
            instructions: self.build_system_instructions(repair_errors),
            user_prompt,
            messages: Vec::new(),
        }
    }

    fn build_system_instructions(&self, repair_errors: Option<&[String]>) -> String {
        let mut system = self.instructions.instructions.clone();

        if !self.instructions.task_type.is_empty() {
            system.push_str(&format!("\n\nThe task type is: {}", self.instructions.task_type));
        }

        if let Some(errors) = repair_errors {
            system.push_str("\n\n");
            system.push_str(&self.instructions.retry_instructions);

            if !errors.is_empty() {
                system.push_str("\n\nProblems with the previous translation:\n");
                for error in errors {
                    system.push_str(&format!("- {}\n", error));
                }
            }
        }

        system
    }
}

/// The context block: names, description and scene history, omitting
/// whatever is empty
fn format_context(context: &BatchContext) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(description) = context.description.as_ref().filter(|text| !text.is_empty()) {
        parts.push(format!("Description: {}", description));
    }

    if !context.names.is_empty() {
        parts.push(format!("Names: {}", context.names.join(", ")));
    }

    if !context.history.is_empty() {
        let mut history = String::from("Context from earlier batches:");
        for summary in &context.history {
            history.push_str(&format!("\n- {}", summary));
        }
        parts.push(history);
    }

    parts.join("\n")
}

/// The batch payload: one stanza per line, in order
pub fn format_payload(lines: &[SubtitleLine]) -> String {
    let stanzas: Vec<String> = lines
        .iter()
        .map(|line| format!("#{}\nOriginal>\n{}\nTranslation>\n", line.number, line.text))
        .collect();

    stanzas.join("\n")
}
