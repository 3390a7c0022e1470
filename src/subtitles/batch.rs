use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::line::SubtitleLine;

/// Context supplied to the model alongside a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchContext {
    /// Names whose spelling should be preserved
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,

    /// Description of the source material
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Rolling history of earlier batch summaries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<String>,
}

/// An ordered run of lines submitted to the LLM as one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleBatch {
    /// Owning scene number
    pub scene: usize,

    /// 1-based batch number within the scene
    pub number: usize,

    /// Summary of the batch produced by the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// The lines as fed in
    pub originals: Vec<SubtitleLine>,

    /// The aligned translated lines; same count and numbers on success
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub translated: Vec<SubtitleLine>,

    /// Context used for the most recent request
    #[serde(default, skip_serializing_if = "context_is_empty")]
    pub context: BatchContext,

    /// Raw model response, retained for diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,

    /// Errors from the most recent attempt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

fn context_is_empty(context: &BatchContext) -> bool {
    context == &BatchContext::default()
}

impl SubtitleBatch {
    /// Create an empty batch
    pub fn new(scene: usize, number: usize) -> Self {
        SubtitleBatch {
            scene,
            number,
            summary: None,
            originals: Vec::new(),
            translated: Vec::new(),
            context: BatchContext::default(),
            translation: None,
            errors: Vec::new(),
        }
    }

    /// Number of original lines in the batch
    pub fn size(&self) -> usize {
        self.originals.len()
    }

    /// First line number in the batch, if any
    pub fn first_line_number(&self) -> Option<usize> {
        self.originals.first().map(|line| line.number)
    }

    /// Last line number in the batch, if any
    pub fn last_line_number(&self) -> Option<usize> {
        self.originals.last().map(|line| line.number)
    }

    /// Start instant of the first line
    pub fn start(&self) -> Option<Duration> {
        self.originals.first().map(|line| line.start)
    }

    /// End instant of the last line
    pub fn end(&self) -> Option<Duration> {
        self.originals.last().map(|line| line.end)
    }

    /// Whether any original has a non-empty translation
    pub fn any_translated(&self) -> bool {
        self.originals.iter().any(|line| line.has_translation())
    }

    /// Whether every original has a non-empty translation
    pub fn all_translated(&self) -> bool {
        !self.originals.is_empty() && self.originals.iter().all(|line| line.has_translation())
    }

    /// Look up an original line by number
    pub fn get_original(&self, number: usize) -> Option<&SubtitleLine> {
        self.originals.iter().find(|line| line.number == number)
    }

    /// Apply a translation to the original with the given number.
    /// Returns false when the number is not in the batch.
    pub fn set_translation(&mut self, number: usize, translation: impl Into<String>) -> bool {
        match self.originals.iter_mut().find(|line| line.number == number) {
            Some(line) => {
                line.translation = Some(translation.into());
                true
            }
            None => false,
        }
    }

    /// Rebuild the aligned `translated` lines from the originals' translations
    pub fn update_translated_lines(&mut self) {
        self.translated = self
            .originals
            .iter()
            .filter(|line| line.has_translation())
            .map(|line| {
                let mut translated = line.clone();
                translated.text = line.translation.clone().unwrap_or_default();
                translated.translation = None;
                translated
            })
            .collect();
    }

    /// Intra-batch gaps between consecutive lines
    pub fn gaps(&self) -> Vec<Duration> {
        self.originals
            .windows(2)
            .map(|pair| pair[1].gap_from(&pair[0]))
            .collect()
    }
}
