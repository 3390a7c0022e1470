/*!
 * Pre-translation text preparation.
 *
 * Applies the configured substitutions, normalises whitespace and splits
 * over-long display lines at a break boundary before the lines are
 * batched and sent for translation.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::settings::{Substitution, SubstitutionMode};
use crate::subtitles::SubtitleLine;

static WHITESPACE_RUN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());

/// Configuration for the preprocessor
#[derive(Debug, Clone)]
pub struct PreprocessorOptions {
    /// Substitutions applied to every line
    pub substitutions: Vec<Substitution>,
    /// How substitutions match
    pub substitution_mode: SubstitutionMode,
    /// Collapse runs of spaces and trim line ends
    pub normalise_whitespace: bool,
    /// Split display lines longer than this many characters; 0 disables
    pub max_line_length: usize,
}

impl Default for PreprocessorOptions {
    fn default() -> Self {
        Self {
            substitutions: Vec::new(),
            substitution_mode: SubstitutionMode::Auto,
            normalise_whitespace: true,
            max_line_length: 0,
        }
    }
}

/// Applies substitutions, whitespace normalisation and line splitting
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    options: PreprocessorOptions,
}

impl Preprocessor {
    /// Create a preprocessor with the given options
    pub fn new(options: PreprocessorOptions) -> Self {
        Preprocessor { options }
    }

    /// Process every line in place
    pub fn preprocess(&self, lines: &mut [SubtitleLine]) {
        for line in lines.iter_mut() {
            line.text = self.process_text(&line.text);
        }
    }

    /// Process a single text value
    pub fn process_text(&self, text: &str) -> String {
        let mut text = text.to_string();

        for substitution in &self.options.substitutions {
            text = apply_substitution(&text, substitution, self.options.substitution_mode);
        }

        if self.options.normalise_whitespace {
            text = normalise_whitespace(&text);
        }

        if self.options.max_line_length > 0 {
            text = split_long_lines(&text, self.options.max_line_length);
        }

        text
    }
}

/// Apply one substitution according to the matching mode.
/// Auto uses whole-word matching when the pattern is purely ASCII
/// alphanumeric and falls back to partial matching otherwise, so scripts
/// without word boundaries still match.
fn apply_substitution(text: &str, substitution: &Substitution, mode: SubstitutionMode) -> String {
    let whole_words = match mode {
        SubstitutionMode::WholeWords => true,
        SubstitutionMode::PartialWords => false,
        SubstitutionMode::Auto => substitution
            .before
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c.is_ascii_whitespace()),
    };

    if whole_words {
        let pattern = format!(r"\b{}\b", regex::escape(&substitution.before));
        match Regex::new(&pattern) {
            Ok(regex) => regex.replace_all(text, substitution.after.as_str()).into_owned(),
            Err(_) => text.replace(&substitution.before, &substitution.after),
        }
    } else {
        text.replace(&substitution.before, &substitution.after)
    }
}

fn normalise_whitespace(text: &str) -> String {
    let collapsed = WHITESPACE_RUN_REGEX.replace_all(text, " ");
    collapsed
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<&str>>()
        .join("\n")
}

/// Insert a hard break near the middle of any display line longer than
/// `max_length`, choosing the whitespace position closest to the centre.
fn split_long_lines(text: &str, max_length: usize) -> String {
    text.split('\n')
        .map(|display_line| {
            if display_line.chars().count() <= max_length {
                return display_line.to_string();
            }
            match best_split_position(display_line) {
                Some(position) => {
                    let (left, right) = display_line.split_at(position);
                    format!("{}\n{}", left.trim_end(), right.trim_start())
                }
                None => display_line.to_string(),
            }
        })
        .collect::<Vec<String>>()
        .join("\n")
}

/// Byte index of the whitespace closest to the middle of the line
fn best_split_position(line: &str) -> Option<usize> {
    let middle = line.len() / 2;
    line.char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .min_by_key(|(index, _)| index.abs_diff(middle))
        .map(|(index, _)| index)
}
