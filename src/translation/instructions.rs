/*!
 * Translation instructions and instruction files.
 *
 * Instructions are the system-side briefing sent with every request: the
 * task prompt, the main instructions, and the retry instructions used for
 * repair attempts. They can be customised through instruction files in
 * either the sectioned `### name` format or the legacy format where a
 * line of three or more `#` characters separates main from retry
 * instructions.
 */

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::errors::SubtitleError;

/// Default task type
pub const DEFAULT_TASK_TYPE: &str = "Translation";

/// Default user prompt, with conditional tags for movie name and language
pub const DEFAULT_PROMPT: &str = "Translate these subtitles[ for movie][ to language]";

/// Default main instructions sent as the system prompt
pub const DEFAULT_INSTRUCTIONS: &str = "\
The goal is to accurately translate subtitles into a target language.

You will receive a batch of lines for translation. Carefully read through the lines, along with any additional context provided.
Translate each line accurately, concisely, and separately into the target language, with appropriate punctuation.

The translation must have the same number of lines as the original, but you can adapt the content to fit the grammar of the target language.
Make sure to translate all provided lines and do not ask whether to continue.

Use any provided context to enhance your translations. If a name list is provided, ensure names are spelled according to the user's preference.
If you detect obvious errors in the input, correct them in the translation using the available context, but do not improvise.

At the end you should add <summary> and <scene> tags with information about the translation:
<summary>A one or two line synopsis of the current batch.</summary>
<scene>A short summary of the current scene, including any previous batches.</scene>
If the context is unclear, just summarize the dialogue.

Your response will be processed by an automated system, so you MUST respond using the required format:

Example (translating to English):

#200
Original>
変わりゆく時代において、
Translation>
In an ever-changing era,

#501
Original>
進化し続けることが生き残る秘訣です。
Translation>
continuing to evolve is the key to survival.";

/// Default retry instructions included in repair attempts
pub const DEFAULT_RETRY_INSTRUCTIONS: &str = "\
There was an issue with the previous translation.

Translate the subtitles again, ensuring each line is translated SEPARATELY, and EVERY line has a corresponding translation.

Do NOT merge lines together in the translation, it leads to incorrect timings and confusion for the reader.";

/// The prompt, instructions and retry instructions for a translation run
#[derive(Debug, Clone, PartialEq)]
pub struct Instructions {
    /// Task statement template
    pub prompt: String,
    /// Main instructions (system prompt)
    pub instructions: String,
    /// Extra instructions for repair attempts
    pub retry_instructions: String,
    /// Name of the file the instructions were loaded from, if any
    pub instruction_file: Option<String>,
    /// Target language requested by the instruction file, if any
    pub target_language: Option<String>,
    /// Task type label
    pub task_type: String,
}

impl Default for Instructions {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            retry_instructions: DEFAULT_RETRY_INSTRUCTIONS.to_string(),
            instruction_file: None,
            target_language: None,
            task_type: DEFAULT_TASK_TYPE.to_string(),
        }
    }
}

impl Instructions {
    /// Substitute tags in the prompt and instructions.
    ///
    /// `[ for movie]` and `[ to language]` expand conditionally from the
    /// movie name and target language; any other `[key]` tag expands from
    /// the supplied values when non-empty.
    pub fn expand_tags(&mut self, tags: &BTreeMap<String, String>) {
        let mut replacements: Vec<(String, String)> = Vec::new();

        if let Some(movie) = tags.get("movie_name").filter(|v| !v.is_empty()) {
            replacements.push(("[ for movie]".to_string(), format!(" for {}", movie)));
        }
        if let Some(language) = tags.get("to_language").filter(|v| !v.is_empty()) {
            replacements.push(("[ to language]".to_string(), format!(" to {}", language)));
        }

        for (key, value) in tags {
            if !value.is_empty() {
                replacements.push((format!("[{}]", key), value.clone()));
            }
        }

        self.prompt = replace_tags(&self.prompt, &replacements);
        self.instructions = replace_tags(&self.instructions, &replacements);
        self.retry_instructions = replace_tags(&self.retry_instructions, &replacements);
    }
}

fn replace_tags(text: &str, replacements: &[(String, String)]) -> String {
    let mut text = text.to_string();
    for (tag, value) in replacements {
        text = text.replace(tag, value);
    }
    // Unexpanded conditional tags disappear
    text.replace("[ for movie]", "").replace("[ to language]", "")
}

/// Load instructions, resolving the path against the working directory and
/// then the per-user instructions directory.
pub fn load_instructions(filename: &str) -> Result<Instructions, SubtitleError> {
    let path = Path::new(filename);
    if path.is_absolute() && path.exists() {
        return load_instructions_file(path);
    }

    if path.exists() {
        return load_instructions_file(path);
    }

    let user_path = user_instructions_path(filename);
    if user_path.exists() {
        return load_instructions_file(&user_path);
    }

    Err(SubtitleError::ProjectError(format!("Instruction file not found: {}", filename)))
}

/// The per-user directory for instruction files
pub fn user_instructions_path(filename: &str) -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("llm-subtrans").join("instructions").join(filename)
}

/// Load instructions from a specific file
pub fn load_instructions_file(path: &Path) -> Result<Instructions, SubtitleError> {
    let content = std::fs::read_to_string(path)?;
    let filename = path.file_name().map(|name| name.to_string_lossy().to_string());

    let mut instructions = parse_instructions(&content)?;
    instructions.instruction_file = filename;
    info!("Loaded instructions from {}", path.display());
    Ok(instructions)
}

/// Parse instruction file content in either supported format
pub fn parse_instructions(content: &str) -> Result<Instructions, SubtitleError> {
    let lines: Vec<&str> = content.lines().map(str::trim_end).collect();

    if lines.is_empty() {
        return Ok(Instructions::default());
    }

    if lines[0].trim_start().starts_with("###") {
        parse_sectioned_instructions(&lines)
    } else {
        debug!("Parsing legacy instruction format");
        Ok(parse_legacy_instructions(&lines))
    }
}

/// Modern format: `### section` headers introduce prompt, instructions,
/// retry_instructions, target_language and task_type sections.
fn parse_sectioned_instructions(lines: &[&str]) -> Result<Instructions, SubtitleError> {
    let mut sections: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in lines {
        if let Some(name) = line.trim_start().strip_prefix("###") {
            let name = name.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }

        if let Some(section) = &current {
            let entry = sections.entry(section.clone()).or_default();
            if !line.trim().is_empty() || !entry.is_empty() {
                entry.push(line.to_string());
            }
        }
    }

    let section_text = |name: &str| -> Option<String> {
        sections.get(name).map(|lines| lines.join("\n").trim().to_string())
    };

    let prompt = section_text("prompt").unwrap_or_default();
    let instructions = section_text("instructions").unwrap_or_default();

    if prompt.is_empty() || instructions.is_empty() {
        return Err(SubtitleError::parse("Invalid instruction file: prompt and instructions are required"));
    }

    Ok(Instructions {
        prompt,
        instructions,
        retry_instructions: section_text("retry_instructions")
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| DEFAULT_RETRY_INSTRUCTIONS.to_string()),
        instruction_file: None,
        target_language: section_text("target_language").filter(|text| !text.is_empty()),
        task_type: section_text("task_type")
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| DEFAULT_TASK_TYPE.to_string()),
    })
}

/// Legacy format: an optional divider line of three or more `#` characters
/// separates main instructions from retry instructions. Without a divider
/// the whole file is main instructions and the default retry instructions
/// apply.
fn parse_legacy_instructions(lines: &[&str]) -> Instructions {
    let divider = lines
        .iter()
        .position(|line| line.len() >= 3 && line.chars().all(|c| c == '#'));

    let (main, retry) = match divider {
        Some(index) => (lines[..index].join("\n"), Some(lines[index + 1..].join("\n"))),
        None => (lines.join("\n"), None),
    };

    Instructions {
        instructions: main.trim().to_string(),
        retry_instructions: retry
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| DEFAULT_RETRY_INSTRUCTIONS.to_string()),
        ..Instructions::default()
    }
}
