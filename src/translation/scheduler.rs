/*!
 * Scene iteration and batch scheduling.
 *
 * The scene translator walks scenes in number order, resubmitting only
 * batches that still need translation, and applies each result to the
 * tree through the scoped editor before emitting events. Sequential mode
 * guarantees scene-then-batch event order; parallel mode fans batches out
 * across scenes to a bounded worker pool and is refused when the provider
 * reports a rate limit.
 */

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, info};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;

use crate::batcher::{Batcher, BatcherOptions};
use crate::errors::{SubtitleError, TranslationError};
use crate::helpers;
use crate::preprocessor::{Preprocessor, PreprocessorOptions};
use crate::providers::TranslationClient;
use crate::settings::ProjectSettings;
use crate::subtitles::{
    editor::edit_with_rollback, BatchContext, BatchTranslationUpdate, SubtitleBatch, SubtitleLine,
    Subtitles,
};

use super::events::{BatchEvent, SceneEvent, TranslationEvent, TranslationEvents};
use super::instructions::Instructions;
use super::parser::parse_response;
use super::prompt::PromptBuilder;
use super::translator::{BatchResult, BatchTranslator, TranslatorOptions};

static NAME_TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][a-z]{2,}$").unwrap());

/// Which batches and lines of a scene to translate
#[derive(Debug, Clone, Default)]
pub struct SceneScope {
    /// Batch numbers to translate; `None` means every batch
    pub batches: Option<Vec<usize>>,
    /// Line numbers to translate; `None` means every line
    pub lines: Option<Vec<usize>>,
}

/// Scene numbers to translate, each with an optional batch/line filter
pub type TranslationScope = BTreeMap<usize, SceneScope>;

/// Options for the scene translator
#[derive(Debug, Clone)]
pub struct SceneTranslatorOptions {
    /// Translate batches across scenes concurrently
    pub parallel: bool,
    /// Worker pool size in parallel mode
    pub worker_limit: usize,
    /// How many earlier batch summaries to carry as context
    pub context_history_limit: usize,
    /// Restrict translation to these scenes, when set
    pub scope: Option<TranslationScope>,
    /// Batcher configuration
    pub batcher: BatcherOptions,
    /// Preprocessor configuration
    pub preprocessor: PreprocessorOptions,
    /// Batch translator configuration
    pub translator: TranslatorOptions,
}

impl Default for SceneTranslatorOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            worker_limit: 4,
            context_history_limit: 10,
            scope: None,
            batcher: BatcherOptions::default(),
            preprocessor: PreprocessorOptions::default(),
            translator: TranslatorOptions::default(),
        }
    }
}

/// A batch queued for translation, snapshotted outside the tree lock
struct BatchJob {
    scene: usize,
    batch: usize,
    originals: Vec<SubtitleLine>,
    context: BatchContext,
}

/// Drives the translation of a subtitle tree
pub struct SceneTranslator {
    client: Arc<dyn TranslationClient>,
    options: SceneTranslatorOptions,
    /// Event bus observers subscribe to
    pub events: Arc<TranslationEvents>,
    abort: Arc<AtomicBool>,
}

impl SceneTranslator {
    /// Create a scene translator for a client
    pub fn new(client: Arc<dyn TranslationClient>, options: SceneTranslatorOptions) -> Self {
        Self {
            client,
            options,
            events: Arc::new(TranslationEvents::new()),
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The cooperative abort flag; set it to stop at the next suspension
    /// point
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Whether an abort has been requested
    pub fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Translate every untranslated batch in scope.
    ///
    /// Fatal provider errors and exhausted misalignments are recorded on
    /// the affected batch and translation continues; the first of them is
    /// returned at the end so callers can report a failed run while
    /// keeping partial results.
    pub async fn translate_subtitles(
        &self,
        subtitles: &Arc<Mutex<Subtitles>>,
    ) -> Result<(), TranslationError> {
        if self.options.parallel {
            if self.client.rate_limit().is_some() {
                return Err(TranslationError::Subtitle(SubtitleError::ProjectError(
                    "Parallel mode is unavailable: the provider is rate limited".to_string(),
                )));
            }
            self.prepare(subtitles)?;
            self.translate_parallel(subtitles).await
        } else {
            self.prepare(subtitles)?;
            self.translate_sequential(subtitles).await
        }
    }

    /// Batch and preprocess the subtitles when not already done
    fn prepare(&self, subtitles: &Arc<Mutex<Subtitles>>) -> Result<(), TranslationError> {
        let (scenes, batches) = {
            let mut guard = subtitles.lock();

            if guard.scenes.is_empty() {
                let mut preprocessor_options = self.options.preprocessor.clone();
                if preprocessor_options.substitutions.is_empty() {
                    preprocessor_options.substitutions = guard.settings.substitutions.clone();
                    preprocessor_options.substitution_mode = guard.settings.substitution_mode;
                }

                let mut lines = std::mem::take(&mut guard.originals);
                Preprocessor::new(preprocessor_options).preprocess(&mut lines);
                let scenes = Batcher::new(self.options.batcher.clone()).batch_lines(lines);

                edit_with_rollback(&mut guard, |editor| {
                    editor.replace_scenes(scenes);
                    Ok(())
                })?;
            }

            (guard.scenecount(), guard.scenes.iter().map(|scene| scene.batches.len()).sum())
        };

        info!("Translating {} scenes / {} batches", scenes, batches);
        self.events.emit(TranslationEvent::Preprocessed { scenes, batches });
        Ok(())
    }

    async fn translate_sequential(
        &self,
        subtitles: &Arc<Mutex<Subtitles>>,
    ) -> Result<(), TranslationError> {
        let scene_numbers: Vec<usize> = {
            let guard = subtitles.lock();
            guard.scenes.iter().map(|scene| scene.number).collect()
        };

        let mut first_failure: Option<TranslationError> = None;

        for scene_number in scene_numbers {
            if !self.scene_in_scope(scene_number) {
                continue;
            }

            let batch_numbers: Vec<usize> = {
                let guard = subtitles.lock();
                match guard.get_scene(scene_number) {
                    Some(scene) => scene.batches.iter().map(|batch| batch.number).collect(),
                    None => continue,
                }
            };

            let mut translated_any = false;
            for batch_number in batch_numbers {
                if self.aborted() {
                    return Err(TranslationError::Aborted);
                }

                let Some(job) = self.snapshot_batch(subtitles, scene_number, batch_number) else {
                    continue;
                };

                let translator = self.batch_translator(subtitles);
                let outcome = translator.translate_batch(&job.originals, &job.context).await;
                if let Some(error) = self.apply_outcome(subtitles, &job, outcome)? {
                    first_failure.get_or_insert(error);
                } else {
                    translated_any = true;
                }
            }

            if translated_any {
                self.emit_scene_event(subtitles, scene_number);
            }
        }

        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn translate_parallel(
        &self,
        subtitles: &Arc<Mutex<Subtitles>>,
    ) -> Result<(), TranslationError> {
        let jobs = self.snapshot_pending(subtitles);
        if jobs.is_empty() {
            return Ok(());
        }

        let mut remaining_per_scene: BTreeMap<usize, usize> = BTreeMap::new();
        for job in &jobs {
            *remaining_per_scene.entry(job.scene).or_insert(0) += 1;
        }

        let workers = self.options.worker_limit.max(1).min(jobs.len());
        debug!("Parallel translation with {} workers over {} batches", workers, jobs.len());

        let abort = Arc::clone(&self.abort);
        let mut completions = stream::iter(jobs)
            .take_while(move |_| {
                let submit = !abort.load(Ordering::SeqCst);
                futures::future::ready(submit)
            })
            .map(|job| {
                let translator = self.batch_translator(subtitles);
                async move {
                    let outcome = translator.translate_batch(&job.originals, &job.context).await;
                    (job, outcome)
                }
            })
            .buffer_unordered(workers);

        let mut first_failure: Option<TranslationError> = None;

        while let Some((job, outcome)) = completions.next().await {
            let scene = job.scene;
            if let Some(error) = self.apply_outcome(subtitles, &job, outcome)? {
                first_failure.get_or_insert(error);
            }

            if let Some(remaining) = remaining_per_scene.get_mut(&scene) {
                *remaining -= 1;
                if *remaining == 0 {
                    self.emit_scene_event(subtitles, scene);
                }
            }
        }

        if self.aborted() {
            return Err(TranslationError::Aborted);
        }

        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn batch_translator(&self, subtitles: &Arc<Mutex<Subtitles>>) -> BatchTranslator {
        let (prompt_builder, add_rtl_markers) = {
            let guard = subtitles.lock();
            (build_prompt_builder(&guard.settings), guard.settings.add_rtl_markers)
        };

        let mut options = self.options.translator.clone();
        options.add_rtl_markers = add_rtl_markers;

        BatchTranslator::new(
            Arc::clone(&self.client),
            prompt_builder,
            options,
            Arc::clone(&self.events),
            Arc::clone(&self.abort),
        )
    }

    /// Snapshot one batch for translation if it still needs it; `None`
    /// when the batch is already translated or out of scope
    fn snapshot_batch(
        &self,
        subtitles: &Arc<Mutex<Subtitles>>,
        scene_number: usize,
        batch_number: usize,
    ) -> Option<BatchJob> {
        let guard = subtitles.lock();
        let scene = guard.get_scene(scene_number)?;
        let batch = scene.get_batch(batch_number)?;

        if !self.batch_in_scope(scene_number, batch_number) || !needs_translation(batch) {
            return None;
        }

        let originals = self.scoped_lines(scene_number, batch);
        if originals.is_empty() {
            return None;
        }

        Some(BatchJob {
            scene: scene_number,
            batch: batch_number,
            originals,
            context: self.build_context(&guard, scene_number, batch_number),
        })
    }

    /// Snapshot every batch that still needs translation, in order
    fn snapshot_pending(&self, subtitles: &Arc<Mutex<Subtitles>>) -> Vec<BatchJob> {
        let pairs: Vec<(usize, usize)> = {
            let guard = subtitles.lock();
            guard
                .scenes
                .iter()
                .flat_map(|scene| scene.batches.iter().map(|batch| (scene.number, batch.number)))
                .collect()
        };

        pairs
            .into_iter()
            .filter(|(scene, _)| self.scene_in_scope(*scene))
            .filter_map(|(scene, batch)| self.snapshot_batch(subtitles, scene, batch))
            .collect()
    }

    /// Context for a batch: settings plus the rolling history of summaries
    /// from this scene and the immediately preceding one
    fn build_context(&self, subtitles: &Subtitles, scene_number: usize, batch_number: usize) -> BatchContext {
        let mut history: Vec<String> = Vec::new();

        for scene in &subtitles.scenes {
            if scene.number + 1 < scene_number || scene.number > scene_number {
                continue;
            }

            for batch in &scene.batches {
                if scene.number == scene_number && batch.number >= batch_number {
                    break;
                }
                if let Some(summary) = batch.summary.as_ref().filter(|text| !text.is_empty()) {
                    history.push(summary.clone());
                }
            }
        }

        let overflow = history.len().saturating_sub(self.options.context_history_limit);
        history.drain(..overflow);

        BatchContext {
            names: subtitles.settings.names.clone(),
            description: subtitles.settings.description.clone(),
            history,
        }
    }

    /// Apply a batch outcome to the tree and emit its events.
    /// Returns `Ok(Some(error))` for failures that should be recorded but
    /// not stop the run; propagates aborts.
    fn apply_outcome(
        &self,
        subtitles: &Arc<Mutex<Subtitles>>,
        job: &BatchJob,
        outcome: Result<BatchResult, TranslationError>,
    ) -> Result<Option<TranslationError>, TranslationError> {
        match outcome {
            Ok(result) => {
                let event = self.apply_result(subtitles, job, result)?;
                self.events.emit(TranslationEvent::BatchTranslated(event));
                Ok(None)
            }

            Err(TranslationError::Aborted) => Err(TranslationError::Aborted),

            Err(error) => {
                let message = format!(
                    "Scene {} batch {} failed: {}",
                    job.scene, job.batch, error
                );

                {
                    let mut guard = subtitles.lock();
                    edit_with_rollback(&mut guard, |editor| {
                        editor.update_batch_translation(
                            job.scene,
                            job.batch,
                            BatchTranslationUpdate {
                                errors: vec![error.to_string()],
                                ..BatchTranslationUpdate::default()
                            },
                        )
                    })?;
                }

                self.events.emit(TranslationEvent::Error(message));
                Ok(Some(error))
            }
        }
    }

    /// Write a successful result into the tree, update the scene summary
    /// and the names list, and build the batch event
    fn apply_result(
        &self,
        subtitles: &Arc<Mutex<Subtitles>>,
        job: &BatchJob,
        result: BatchResult,
    ) -> Result<BatchEvent, TranslationError> {
        let discovered = discover_names(result.translations.values().map(String::as_str));

        let mut guard = subtitles.lock();
        let update = BatchTranslationUpdate {
            translations: result.translations,
            summary: result.summary,
            scene_summary: result.scene_summary,
            raw_response: Some(result.raw_response),
            errors: result.errors,
            context: Some(job.context.clone()),
        };

        edit_with_rollback(&mut guard, |editor| {
            editor.update_batch_translation(job.scene, job.batch, update)?;
            editor.append_names(discovered);
            Ok(())
        })?;

        let batch = guard
            .get_scene(job.scene)
            .and_then(|scene| scene.get_batch(job.batch))
            .ok_or_else(|| {
                SubtitleError::InvariantViolation(format!(
                    "Batch {}/{} disappeared while applying its translation",
                    job.scene, job.batch
                ))
            })?;

        Ok(BatchEvent {
            scene: job.scene,
            batch: job.batch,
            lines: batch.size(),
            translated: batch.originals.iter().filter(|line| line.has_translation()).count(),
            all_translated: batch.all_translated(),
        })
    }

    fn emit_scene_event(&self, subtitles: &Arc<Mutex<Subtitles>>, scene_number: usize) {
        let event = {
            let guard = subtitles.lock();
            guard.get_scene(scene_number).map(|scene| SceneEvent {
                scene: scene_number,
                batches: scene.batches.len(),
                all_translated: scene.all_translated(),
            })
        };

        if let Some(event) = event {
            self.events.emit(TranslationEvent::SceneTranslated(event));
        }
    }

    fn scene_in_scope(&self, scene_number: usize) -> bool {
        match &self.options.scope {
            Some(scope) => scope.contains_key(&scene_number),
            None => true,
        }
    }

    fn batch_in_scope(&self, scene_number: usize, batch_number: usize) -> bool {
        match &self.options.scope {
            Some(scope) => match scope.get(&scene_number) {
                Some(scene_scope) => scene_scope
                    .batches
                    .as_ref()
                    .map(|batches| batches.contains(&batch_number))
                    .unwrap_or(true),
                None => false,
            },
            None => true,
        }
    }

    /// The lines of a batch selected by the scope filter
    fn scoped_lines(&self, scene_number: usize, batch: &SubtitleBatch) -> Vec<SubtitleLine> {
        let line_filter = self
            .options
            .scope
            .as_ref()
            .and_then(|scope| scope.get(&scene_number))
            .and_then(|scene_scope| scene_scope.lines.clone());

        batch
            .originals
            .iter()
            .filter(|line| match &line_filter {
                Some(numbers) => numbers.contains(&line.number),
                None => true,
            })
            .cloned()
            .collect()
    }
}

/// Whether a batch still needs to be submitted: it is untranslated, or its
/// saved response blob does not account for every line
pub fn needs_translation(batch: &SubtitleBatch) -> bool {
    if batch.originals.is_empty() {
        return false;
    }

    if !batch.all_translated() {
        return true;
    }

    match &batch.translation {
        Some(raw) => parse_response(raw).translations.len() != batch.originals.len(),
        None => true,
    }
}

/// Build the prompt builder for the current settings: overrides applied to
/// the default instructions, then tags expanded
pub fn build_prompt_builder(settings: &ProjectSettings) -> PromptBuilder {
    let mut instructions = Instructions::default();

    if let Some(prompt) = settings.prompt.as_ref().filter(|text| !text.is_empty()) {
        instructions.prompt = prompt.clone();
    }
    if let Some(main) = settings.instructions.as_ref().filter(|text| !text.is_empty()) {
        instructions.instructions = main.clone();
    }
    if let Some(retry) = settings.retry_instructions.as_ref().filter(|text| !text.is_empty()) {
        instructions.retry_instructions = retry.clone();
    }
    if let Some(task_type) = settings.task_type.as_ref().filter(|text| !text.is_empty()) {
        instructions.task_type = task_type.clone();
    }

    let mut tags = BTreeMap::new();
    if let Some(movie) = &settings.movie_name {
        tags.insert("movie_name".to_string(), movie.clone());
    }
    if let Some(language) = &settings.target_language {
        let display = helpers::get_language_name(language).unwrap_or_else(|_| language.clone());
        tags.insert("to_language".to_string(), display.clone());
        tags.insert("target_language".to_string(), display);
    }
    if let Some(description) = &settings.description {
        tags.insert("description".to_string(), description.clone());
    }
    if let Some(movie) = &settings.movie_name {
        tags.insert("movie".to_string(), movie.clone());
    }

    instructions.expand_tags(&tags);
    PromptBuilder::new(instructions)
}

/// Best-effort scan for names: capitalised tokens that appear after the
/// start of a sentence
fn discover_names<'a>(texts: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut names = Vec::new();

    for text in texts {
        let words: Vec<&str> = text.split_whitespace().collect();
        for (index, word) in words.iter().enumerate() {
            if index == 0 {
                continue;
            }
            let previous = words[index - 1];
            if previous.ends_with(['.', '!', '?']) {
                continue;
            }

            let token = word.trim_matches(|c: char| !c.is_alphanumeric());
            if NAME_TOKEN_REGEX.is_match(token) && !names.iter().any(|existing| existing == token) {
                names.push(token.to_string());
            }
        }
    }

    names
}
