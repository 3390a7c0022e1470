use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::errors::SubtitleError;
use crate::formats::{FormatRegistry, SubtitleData, SubtitleFileHandler, VoidFileHandler};
use crate::settings::ProjectSettings;

use super::line::SubtitleLine;
use super::metadata::{Metadata, MetadataValue};
use super::scene::SubtitleScene;

/// Root container for a subtitle file: ordered scenes, file-level metadata
/// and the project settings.
///
/// Flat `originals` hold the loaded lines before batching; once the batcher
/// has produced scenes, the scenes are the authoritative copy and are what
/// gets persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subtitles {
    /// Project settings (target language, prompt, provider…).
    /// Deserialised through the settings boundary so legacy keys from
    /// older project files are upgraded on load.
    #[serde(default, deserialize_with = "crate::settings::deserialize_settings")]
    pub settings: ProjectSettings,

    /// File-level metadata from the format handler (styles, headers…)
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,

    /// Path of the source subtitle file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourcepath: Option<PathBuf>,

    /// Path the translated subtitles will be written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputpath: Option<PathBuf>,

    /// Detected or selected output format extension (e.g. ".srt")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_format: Option<String>,

    /// The scene/batch/line tree
    #[serde(default)]
    pub scenes: Vec<SubtitleScene>,

    /// Loaded lines awaiting batching; not persisted
    #[serde(skip)]
    pub originals: Vec<SubtitleLine>,

    /// First line number reported by the handler, used when recomposing
    #[serde(skip)]
    pub start_line_number: Option<usize>,
}

impl Subtitles {
    /// Create an empty container with the given settings
    pub fn new(settings: ProjectSettings) -> Self {
        Subtitles { settings, ..Subtitles::default() }
    }

    /// Load subtitles from a file, choosing the handler by extension
    pub fn load_file(&mut self, path: &Path, registry: &FormatRegistry) -> Result<(), SubtitleError> {
        let handler = registry.create_handler_for_path(path)?;
        let data = handler.parse_file(path)?;

        info!("Loaded {} lines from {}", data.lines.len(), path.display());
        self.apply_data(data);
        self.sourcepath = Some(path.to_path_buf());
        Ok(())
    }

    /// Populate the container from parsed subtitle data
    pub fn apply_data(&mut self, data: SubtitleData) {
        self.originals = data.lines;
        self.metadata = data.metadata;
        self.start_line_number = data.start_line_number;
        if self.file_format.is_none() {
            self.file_format = data.detected_format;
        }
        self.scenes.clear();
    }

    /// Whether the container holds any lines, batched or not
    pub fn has_subtitles(&self) -> bool {
        !self.originals.is_empty() || self.linecount() > 0
    }

    /// Total number of lines
    pub fn linecount(&self) -> usize {
        if self.scenes.is_empty() {
            self.originals.len()
        } else {
            self.scenes.iter().map(|scene| scene.linecount()).sum()
        }
    }

    /// Number of scenes
    pub fn scenecount(&self) -> usize {
        self.scenes.len()
    }

    /// Whether any line has a translation
    pub fn any_translated(&self) -> bool {
        self.scenes.iter().any(|scene| scene.any_translated())
    }

    /// Whether every line has a translation
    pub fn all_translated(&self) -> bool {
        !self.scenes.is_empty() && self.scenes.iter().all(|scene| scene.all_translated())
    }

    /// Look up a scene by number
    pub fn get_scene(&self, number: usize) -> Option<&SubtitleScene> {
        self.scenes.iter().find(|scene| scene.number == number)
    }

    /// Look up a scene by number, mutably
    pub fn get_scene_mut(&mut self, number: usize) -> Option<&mut SubtitleScene> {
        self.scenes.iter_mut().find(|scene| scene.number == number)
    }

    /// Iterate every line in the tree in order
    pub fn all_lines(&self) -> impl Iterator<Item = &SubtitleLine> {
        self.scenes
            .iter()
            .flat_map(|scene| scene.batches.iter())
            .flat_map(|batch| batch.originals.iter())
    }

    /// Renumber scenes and batches from 1, re-point batches at their owning
    /// scene and drop empty batches and scenes.
    pub fn sanitise(&mut self) {
        for scene in &mut self.scenes {
            scene.batches.retain(|batch| !batch.originals.is_empty());
        }
        self.scenes.retain(|scene| !scene.batches.is_empty());

        for (scene_index, scene) in self.scenes.iter_mut().enumerate() {
            scene.number = scene_index + 1;
            for (batch_index, batch) in scene.batches.iter_mut().enumerate() {
                batch.number = batch_index + 1;
                batch.scene = scene.number;
            }
        }
    }

    /// The handler for the current output format, or the void handler when
    /// no format is known yet
    pub fn create_handler(&self, registry: &FormatRegistry) -> Box<dyn SubtitleFileHandler> {
        let extension = self
            .outputpath
            .as_deref()
            .and_then(FormatRegistry::format_from_path)
            .or_else(|| self.file_format.clone())
            .or_else(|| self.sourcepath.as_deref().and_then(FormatRegistry::format_from_path));

        match extension {
            Some(extension) => registry
                .create_handler(&extension)
                .unwrap_or_else(|_| Box::new(VoidFileHandler)),
            None => Box::new(VoidFileHandler),
        }
    }

    /// Build the data to compose for the translated output: every line in
    /// order with its translation as the text where one exists. With the
    /// `include_original` setting the original text is kept above the
    /// translation.
    pub fn build_translated_data(&self) -> SubtitleData {
        let include_original = self.settings.include_original;

        let lines: Vec<SubtitleLine> = self
            .all_lines()
            .map(|line| {
                let mut output = line.clone();
                if let Some(translation) = &line.translation {
                    output.text = if include_original {
                        format!("{}\n{}", line.text, translation)
                    } else {
                        translation.clone()
                    };
                }
                output.translation = None;
                output
            })
            .collect();

        let mut metadata = self.metadata.clone();
        if self.settings.add_rtl_markers {
            metadata.insert("add_rtl_markers".to_string(), MetadataValue::Bool(true));
        }

        SubtitleData {
            lines,
            metadata,
            start_line_number: self.start_line_number,
            detected_format: self.file_format.clone(),
        }
    }

    /// Build the data to compose for the original (untranslated) output
    pub fn build_original_data(&self) -> SubtitleData {
        let lines = if self.scenes.is_empty() {
            self.originals.clone()
        } else {
            self.all_lines().cloned().collect()
        };

        SubtitleData {
            lines,
            metadata: self.metadata.clone(),
            start_line_number: self.start_line_number,
            detected_format: self.file_format.clone(),
        }
    }

    /// Compose and write the translated subtitles to the output path
    pub fn save_translation(&self, registry: &FormatRegistry) -> Result<(), SubtitleError> {
        let outputpath = self
            .outputpath
            .clone()
            .ok_or_else(|| SubtitleError::ProjectError("No output path set".to_string()))?;

        let handler = self.create_handler(registry);
        let content = handler.compose(&self.build_translated_data())?;
        std::fs::write(&outputpath, content)?;

        info!("Translation saved to {}", outputpath.display());
        Ok(())
    }
}
