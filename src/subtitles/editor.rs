/*!
 * Scoped editing of the subtitle tree.
 *
 * The editor is the sole mutation path: it validates operations against
 * the tree invariants, runs `sanitise` after a successful edit and rolls
 * the tree back to its entry snapshot when the edit fails. Callers drive
 * it through `SubtitleProject::edit`, which holds the project mutex for
 * the duration of the scope and fires the dirty callback on success.
 */

use std::collections::BTreeMap;

use crate::errors::SubtitleError;

use super::batch::{BatchContext, SubtitleBatch};
use super::file::Subtitles;
use super::line::SubtitleLine;
use super::scene::SubtitleScene;

/// The result of translating a batch, applied to the tree in one step
#[derive(Debug, Clone, Default)]
pub struct BatchTranslationUpdate {
    /// Translations keyed by line number
    pub translations: BTreeMap<usize, String>,
    /// Batch summary reported by the model
    pub summary: Option<String>,
    /// Scene summary reported by the model
    pub scene_summary: Option<String>,
    /// Raw model response, kept for diagnostics
    pub raw_response: Option<String>,
    /// Validation problems from the final attempt
    pub errors: Vec<String>,
    /// Context the request was made with
    pub context: Option<BatchContext>,
}

/// Validated mutable access to a subtitle tree
pub struct SubtitleEditor<'a> {
    subtitles: &'a mut Subtitles,
}

impl<'a> SubtitleEditor<'a> {
    /// Wrap a subtitle tree for editing
    pub fn new(subtitles: &'a mut Subtitles) -> Self {
        SubtitleEditor { subtitles }
    }

    /// Read access to the tree during an edit
    pub fn subtitles(&self) -> &Subtitles {
        self.subtitles
    }

    /// Replace the whole scene list (used after batching)
    pub fn replace_scenes(&mut self, scenes: Vec<SubtitleScene>) {
        self.subtitles.scenes = scenes;
    }

    /// Append a scene; its number must not collide with an existing scene
    pub fn add_scene(&mut self, scene: SubtitleScene) -> Result<(), SubtitleError> {
        if self.subtitles.get_scene(scene.number).is_some() {
            return Err(SubtitleError::InvariantViolation(format!(
                "Scene {} already exists",
                scene.number
            )));
        }
        self.subtitles.scenes.push(scene);
        Ok(())
    }

    /// Remove a scene by number
    pub fn remove_scene(&mut self, number: usize) -> Result<(), SubtitleError> {
        let before = self.subtitles.scenes.len();
        self.subtitles.scenes.retain(|scene| scene.number != number);
        if self.subtitles.scenes.len() == before {
            return Err(SubtitleError::InvariantViolation(format!("Unknown scene number: {}", number)));
        }
        Ok(())
    }

    /// Append a batch to a scene
    pub fn add_batch(&mut self, scene_number: usize, batch: SubtitleBatch) -> Result<(), SubtitleError> {
        let scene = self.require_scene(scene_number)?;
        if scene.get_batch(batch.number).is_some() {
            return Err(SubtitleError::InvariantViolation(format!(
                "Batch {} already exists in scene {}",
                batch.number, scene_number
            )));
        }
        scene.batches.push(batch);
        Ok(())
    }

    /// Remove a batch from a scene
    pub fn remove_batch(&mut self, scene_number: usize, batch_number: usize) -> Result<(), SubtitleError> {
        let scene = self.require_scene(scene_number)?;
        let before = scene.batches.len();
        scene.batches.retain(|batch| batch.number != batch_number);
        if scene.batches.len() == before {
            return Err(SubtitleError::InvariantViolation(format!(
                "Unknown batch {} in scene {}",
                batch_number, scene_number
            )));
        }
        Ok(())
    }

    /// Add a line to a batch; its number must be unique within the batch
    pub fn add_line(
        &mut self,
        scene_number: usize,
        batch_number: usize,
        line: SubtitleLine,
    ) -> Result<(), SubtitleError> {
        let batch = self.require_batch(scene_number, batch_number)?;
        if batch.get_original(line.number).is_some() {
            return Err(SubtitleError::InvariantViolation(format!(
                "Duplicate line number {} in batch {}",
                line.number, batch_number
            )));
        }

        let position = batch
            .originals
            .iter()
            .position(|existing| existing.number > line.number)
            .unwrap_or(batch.originals.len());
        batch.originals.insert(position, line);
        Ok(())
    }

    /// Remove a line from a batch by number
    pub fn remove_line(
        &mut self,
        scene_number: usize,
        batch_number: usize,
        line_number: usize,
    ) -> Result<(), SubtitleError> {
        let batch = self.require_batch(scene_number, batch_number)?;
        let before = batch.originals.len();
        batch.originals.retain(|line| line.number != line_number);
        if batch.originals.len() == before {
            return Err(SubtitleError::InvariantViolation(format!(
                "Unknown line {} in scene {} batch {}",
                line_number, scene_number, batch_number
            )));
        }
        batch.translated.retain(|line| line.number != line_number);
        Ok(())
    }

    /// Set the translation of a single line
    pub fn set_line_translation(
        &mut self,
        scene_number: usize,
        batch_number: usize,
        line_number: usize,
        translation: impl Into<String>,
    ) -> Result<(), SubtitleError> {
        let batch = self.require_batch(scene_number, batch_number)?;
        if !batch.set_translation(line_number, translation) {
            return Err(SubtitleError::InvariantViolation(format!(
                "Unknown line {} in scene {} batch {}",
                line_number, scene_number, batch_number
            )));
        }
        batch.update_translated_lines();
        Ok(())
    }

    /// Apply the outcome of a batch translation in one step
    pub fn update_batch_translation(
        &mut self,
        scene_number: usize,
        batch_number: usize,
        update: BatchTranslationUpdate,
    ) -> Result<(), SubtitleError> {
        let scene_summary = update.scene_summary.clone();

        {
            let batch = self.require_batch(scene_number, batch_number)?;

            for (line_number, translation) in &update.translations {
                if batch.get_original(*line_number).is_none() {
                    return Err(SubtitleError::InvariantViolation(format!(
                        "Translation for unknown line {} in scene {} batch {}",
                        line_number, scene_number, batch_number
                    )));
                }
                batch.set_translation(*line_number, translation.clone());
            }

            if update.summary.is_some() {
                batch.summary = update.summary;
            }
            if let Some(context) = update.context {
                batch.context = context;
            }
            batch.translation = update.raw_response;
            batch.errors = update.errors;
            batch.update_translated_lines();
        }

        if let Some(scene_summary) = scene_summary {
            let scene = self.require_scene(scene_number)?;
            scene.summary = Some(scene_summary);
        }

        Ok(())
    }

    /// Update a scene's rolling summary
    pub fn update_scene_summary(
        &mut self,
        scene_number: usize,
        summary: impl Into<String>,
    ) -> Result<(), SubtitleError> {
        let scene = self.require_scene(scene_number)?;
        scene.summary = Some(summary.into());
        Ok(())
    }

    /// Append newly discovered names to the settings names list
    pub fn append_names(&mut self, names: impl IntoIterator<Item = String>) {
        for name in names {
            let name = name.trim().to_string();
            if !name.is_empty() && !self.subtitles.settings.names.contains(&name) {
                self.subtitles.settings.names.push(name);
            }
        }
    }

    fn require_scene(&mut self, number: usize) -> Result<&mut SubtitleScene, SubtitleError> {
        self.subtitles
            .get_scene_mut(number)
            .ok_or_else(|| SubtitleError::InvariantViolation(format!("Unknown scene number: {}", number)))
    }

    fn require_batch(
        &mut self,
        scene_number: usize,
        batch_number: usize,
    ) -> Result<&mut SubtitleBatch, SubtitleError> {
        self.require_scene(scene_number)?
            .get_batch_mut(batch_number)
            .ok_or_else(|| {
                SubtitleError::InvariantViolation(format!(
                    "Unknown batch {} in scene {}",
                    batch_number, scene_number
                ))
            })
    }
}

/// Run an edit against a tree with snapshot semantics: on success the tree
/// is sanitised, on failure it is restored to its state on entry.
///
/// `SubtitleProject::edit` wraps this with the project mutex and dirty
/// callback; this free function is the core used directly by tests.
pub fn edit_with_rollback<R>(
    subtitles: &mut Subtitles,
    f: impl FnOnce(&mut SubtitleEditor) -> Result<R, SubtitleError>,
) -> Result<R, SubtitleError> {
    let snapshot = subtitles.clone();

    let outcome = {
        let mut editor = SubtitleEditor::new(subtitles);
        f(&mut editor)
    };

    match outcome {
        Ok(result) => {
            subtitles.sanitise();
            Ok(result)
        }
        Err(error) => {
            *subtitles = snapshot;
            Err(error)
        }
    }
}
