/*!
 * Project lifecycle: loading, saving and translating subtitle projects.
 *
 * A project wraps the subtitle tree behind a mutex, decides between
 * loading a source subtitle file and resuming a `.subtrans` project file,
 * owns the dirty flag, and writes translations, project files and the
 * one-time backup of existing projects.
 */

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};
use parking_lot::Mutex;
use serde_json::Value;

use crate::errors::{SubtitleError, TranslationError};
use crate::formats::{default_registry, FormatRegistry};
use crate::helpers;
use crate::subtitles::editor::{edit_with_rollback, SubtitleEditor};
use crate::subtitles::Subtitles;
use crate::translation::{SceneTranslator, TranslationEvent, TranslationEvents};

pub mod serialiser;

pub use serialiser::{BACKUP_SUFFIX, PROJECT_EXTENSION};

/// A subtitle translation project
pub struct SubtitleProject {
    subtitles: Arc<Mutex<Subtitles>>,
    /// Events re-emitted for project observers
    pub events: Arc<TranslationEvents>,
    registry: Arc<FormatRegistry>,
    projectfile: Option<PathBuf>,
    /// Whether the project persists to a `.subtrans` file
    use_project_file: bool,
    /// Whether translations are written to the output file
    pub write_translation: bool,
    existing_project: bool,
    needs_writing: Arc<AtomicBool>,
}

impl SubtitleProject {
    /// Create a project. A persistent project saves to a `.subtrans` file
    /// and resumes from it on the next run.
    pub fn new(persistent: bool) -> Self {
        Self::with_registry(persistent, default_registry())
    }

    /// Create a project with an explicit format registry
    pub fn with_registry(persistent: bool, registry: Arc<FormatRegistry>) -> Self {
        Self {
            subtitles: Arc::new(Mutex::new(Subtitles::default())),
            events: Arc::new(TranslationEvents::new()),
            registry,
            projectfile: None,
            use_project_file: persistent,
            write_translation: true,
            existing_project: false,
            needs_writing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared handle to the subtitle tree
    pub fn subtitles(&self) -> Arc<Mutex<Subtitles>> {
        Arc::clone(&self.subtitles)
    }

    /// The project file path, when one has been derived
    pub fn projectfile(&self) -> Option<&Path> {
        self.projectfile.as_deref()
    }

    /// Whether the project was resumed from an existing project file
    pub fn is_existing_project(&self) -> bool {
        self.existing_project
    }

    /// Whether the project has unsaved changes
    pub fn needs_writing(&self) -> bool {
        self.needs_writing.load(Ordering::SeqCst)
    }

    /// Whether any line has a translation
    pub fn any_translated(&self) -> bool {
        self.subtitles.lock().any_translated()
    }

    /// Whether every line has a translation
    pub fn all_translated(&self) -> bool {
        self.subtitles.lock().all_translated()
    }

    /// The configured target language
    pub fn target_language(&self) -> Option<String> {
        self.subtitles.lock().settings.target_language.clone()
    }

    /// The project file path for a source path: the extension is replaced
    /// with `.subtrans` unless it already is one
    pub fn project_filepath(filepath: &Path) -> PathBuf {
        if filepath.extension().is_some_and(|ext| ext == "subtrans") {
            filepath.to_path_buf()
        } else {
            filepath.with_extension("subtrans")
        }
    }

    /// The backup path for a project file
    pub fn backup_filepath(projectfile: &Path) -> PathBuf {
        let mut path = projectfile.as_os_str().to_owned();
        path.push(BACKUP_SUFFIX);
        PathBuf::from(path)
    }

    /// Initialise the project from a source subtitle file or an existing
    /// project file.
    ///
    /// When the path already names a `.subtrans` file the project becomes
    /// persistent implicitly. An existing project file is read unless
    /// `reload` forces the source subtitles to be parsed again; a backup
    /// of the existing project is written before any mutation.
    pub fn initialise_project(
        &mut self,
        filepath: &Path,
        outputpath: Option<&Path>,
        reload: bool,
    ) -> Result<(), SubtitleError> {
        let mut sourcepath = filepath.to_path_buf();
        let projectfile = Self::project_filepath(filepath);

        if filepath == projectfile {
            self.use_project_file = true;
        }
        self.projectfile = Some(projectfile.clone());

        let project_file_exists = projectfile.exists();
        let read_project = self.use_project_file && project_file_exists;
        let mut load_subtitles = reload || !read_project;

        if project_file_exists && !read_project {
            warn!("Project file {} exists but will not be used", projectfile.display());
        }

        if read_project {
            info!("Loading existing project file {}", projectfile.display());
            self.read_project_file(&projectfile)?;
            self.save_backup_file()?;

            let has_scenes = {
                let guard = self.subtitles.lock();
                if let Some(path) = &guard.sourcepath {
                    sourcepath = path.clone();
                }
                guard.scenecount() > 0
            };

            if has_scenes {
                self.existing_project = true;
                self.needs_writing.store(false, Ordering::SeqCst);
                load_subtitles = reload;
                if load_subtitles {
                    info!("Reloading subtitles from the source file");
                }
            } else {
                error!("Unable to read project file, starting afresh");
                load_subtitles = true;
            }
        }

        if load_subtitles {
            self.load_subtitle_file(&sourcepath)?;
        }

        if !self.subtitles.lock().has_subtitles() {
            return Err(SubtitleError::ProjectError(format!(
                "No subtitles to translate in {}",
                filepath.display()
            )));
        }

        match outputpath {
            Some(path) => {
                let extension = FormatRegistry::format_from_path(path);
                let mut guard = self.subtitles.lock();
                guard.outputpath = Some(path.to_path_buf());
                if extension.is_some() {
                    guard.file_format = extension;
                }
                drop(guard);
                self.needs_writing.store(self.use_project_file, Ordering::SeqCst);
            }
            None => self.update_output_path(None, None)?,
        }

        Ok(())
    }

    /// Set or derive the output path for the translated subtitles.
    /// `.subtrans` is rejected as an output format.
    pub fn update_output_path(
        &self,
        path: Option<&Path>,
        extension: Option<&str>,
    ) -> Result<(), SubtitleError> {
        let mut guard = self.subtitles.lock();

        let base = path
            .map(Path::to_path_buf)
            .or_else(|| guard.sourcepath.clone())
            .ok_or_else(|| SubtitleError::ProjectError("No source path to derive output from".to_string()))?;

        let extension = extension
            .map(str::to_string)
            .or_else(|| guard.file_format.clone())
            .or_else(|| FormatRegistry::format_from_path(&base))
            .unwrap_or_else(|| ".srt".to_string());

        if extension == PROJECT_EXTENSION {
            return Err(SubtitleError::ProjectError(
                "Cannot use .subtrans as an output format".to_string(),
            ));
        }

        let language = guard
            .settings
            .target_language
            .as_deref()
            .map(|code| helpers::get_language_name(code).unwrap_or_else(|_| code.to_string()));

        guard.outputpath = Some(helpers::get_output_path(&base, language.as_deref(), Some(&extension)));
        guard.file_format = Some(extension);
        Ok(())
    }

    /// Load subtitles from a source file, auto-detecting the format
    pub fn load_subtitle_file(&self, path: &Path) -> Result<(), SubtitleError> {
        let mut guard = self.subtitles.lock();
        let settings = guard.settings.clone();
        *guard = Subtitles::new(settings);
        guard.load_file(path, &self.registry)
    }

    /// Update project settings from a loose map, applying the allow-list
    /// and legacy-key upgrades. Marks the project dirty when a recognised
    /// value changed and the tree has content.
    pub fn update_project_settings(&self, settings: BTreeMap<String, Value>) {
        let mut guard = self.subtitles.lock();
        let changed = guard.settings.update(settings);
        let has_scenes = guard.scenecount() > 0;
        drop(guard);

        if changed && has_scenes {
            self.needs_writing.store(self.use_project_file, Ordering::SeqCst);
        }
    }

    /// Run a scoped edit on the subtitle tree. On success the tree is
    /// sanitised, the dirty flag set and an update event emitted; on
    /// failure the tree and dirty flag are untouched.
    pub fn edit<R>(
        &self,
        f: impl FnOnce(&mut SubtitleEditor) -> Result<R, SubtitleError>,
    ) -> Result<R, SubtitleError> {
        let (result, scenes, lines) = {
            let mut guard = self.subtitles.lock();
            let result = edit_with_rollback(&mut guard, f)?;
            (result, guard.scenecount(), guard.linecount())
        };

        self.needs_writing.store(true, Ordering::SeqCst);
        self.events.emit(TranslationEvent::Updated { scenes, lines });
        Ok(result)
    }

    /// Read a project file into the tree
    pub fn read_project_file(&self, path: &Path) -> Result<(), SubtitleError> {
        let decoded = serialiser::read_project_file(path)?;
        *self.subtitles.lock() = decoded;
        Ok(())
    }

    /// Write the project file. Refuses when the tree has no scenes.
    pub fn save_project_file(&self) -> Result<(), SubtitleError> {
        let projectfile = self
            .projectfile
            .clone()
            .ok_or_else(|| SubtitleError::ProjectError("No project file path set".to_string()))?;

        let guard = self.subtitles.lock();
        if guard.scenecount() == 0 {
            return Err(SubtitleError::ProjectError(
                "Cannot write a project file with no scenes".to_string(),
            ));
        }

        serialiser::write_project_file(&guard, &projectfile)?;
        drop(guard);

        self.needs_writing.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Write a backup copy of the project next to the project file
    pub fn save_backup_file(&self) -> Result<(), SubtitleError> {
        if let Some(projectfile) = &self.projectfile {
            let guard = self.subtitles.lock();
            if guard.scenecount() > 0 {
                let backup = Self::backup_filepath(projectfile);
                serialiser::write_project_file(&guard, &backup)?;
            }
        }
        Ok(())
    }

    /// Write the translated subtitles to the output path
    pub fn save_translation(&self) -> Result<(), SubtitleError> {
        self.subtitles.lock().save_translation(&self.registry)
    }

    /// Save whatever needs saving: the project file when persistent, the
    /// translation when any line is translated
    pub fn save_project(&self) -> Result<(), SubtitleError> {
        if !self.needs_writing() {
            return Ok(());
        }

        if self.use_project_file {
            self.save_project_file()?;
        }
        if self.write_translation && self.any_translated() {
            self.save_translation()?;
        }
        self.needs_writing.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Translate the project's subtitles with the given translator, then
    /// save the results. Partial results are saved when the run aborts or
    /// fails midway.
    pub async fn translate_subtitles(
        &self,
        translator: &SceneTranslator,
    ) -> Result<(), TranslationError> {
        self.subscribe_project_observers(translator);

        let outcome = translator.translate_subtitles(&self.subtitles).await;

        match outcome {
            Ok(()) => {
                if self.write_translation {
                    self.save_translation()?;
                }
                if self.use_project_file {
                    self.save_project_file()?;
                }
                Ok(())
            }

            Err(TranslationError::Aborted) => {
                info!("Translation aborted");
                self.save_partial_results();
                Err(TranslationError::Aborted)
            }

            Err(error) => {
                self.save_partial_results();
                error!("Failed to translate subtitles: {}", error);
                Err(error)
            }
        }
    }

    /// Connect the dirty flag and the per-batch autosave to a translator's
    /// event bus
    fn subscribe_project_observers(&self, translator: &SceneTranslator) {
        let needs_writing = Arc::clone(&self.needs_writing);
        let subtitles = Arc::clone(&self.subtitles);
        let projectfile = self.projectfile.clone();
        let use_project_file = self.use_project_file;

        translator.events.subscribe(move |event| {
            if let TranslationEvent::BatchTranslated(_) = event {
                needs_writing.store(use_project_file, Ordering::SeqCst);

                if use_project_file {
                    if let Some(projectfile) = &projectfile {
                        let guard = subtitles.lock();
                        if let Err(error) = serialiser::write_project_file(&guard, projectfile) {
                            error!("Autosave failed: {}", error);
                        }
                    }
                }
            }
        });
    }

    /// Save whatever was translated before a failed or aborted run
    fn save_partial_results(&self) {
        if self.write_translation && self.any_translated() {
            warn!("Saving partial translation results");
            if let Err(error) = self.save_translation() {
                error!("Unable to save partial translation: {}", error);
            }
        }

        if self.use_project_file {
            if let Err(error) = self.save_project_file() {
                error!("Unable to save project file: {}", error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_filepath_derivation() {
        assert_eq!(
            SubtitleProject::project_filepath(Path::new("/tmp/movie.srt")),
            PathBuf::from("/tmp/movie.subtrans")
        );
        assert_eq!(
            SubtitleProject::project_filepath(Path::new("/tmp/movie.subtrans")),
            PathBuf::from("/tmp/movie.subtrans")
        );
    }

    #[test]
    fn test_backup_filepath() {
        assert_eq!(
            SubtitleProject::backup_filepath(Path::new("/tmp/movie.subtrans")),
            PathBuf::from("/tmp/movie.subtrans-backup")
        );
    }

    #[test]
    fn test_output_path_rejects_subtrans() {
        let project = SubtitleProject::new(false);
        project.subtitles.lock().sourcepath = Some(PathBuf::from("/tmp/movie.srt"));

        let result = project.update_output_path(None, Some(".subtrans"));
        assert!(result.is_err());
    }

    #[test]
    fn test_output_path_uses_language_name() {
        let project = SubtitleProject::new(false);
        {
            let mut guard = project.subtitles.lock();
            guard.sourcepath = Some(PathBuf::from("/tmp/movie.srt"));
            guard.settings.target_language = Some("en".to_string());
        }

        project.update_output_path(None, None).unwrap();
        assert_eq!(
            project.subtitles.lock().outputpath,
            Some(PathBuf::from("/tmp/movie.english.srt"))
        );
    }

    #[test]
    fn test_settings_update_marks_dirty_only_with_scenes() {
        let project = SubtitleProject::new(true);

        let mut map = BTreeMap::new();
        map.insert("movie_name".to_string(), Value::String("Test".to_string()));
        project.update_project_settings(map.clone());
        assert!(!project.needs_writing(), "no scenes yet, nothing to persist");

        project
            .subtitles
            .lock()
            .scenes
            .push(crate::subtitles::SubtitleScene::new(1));

        let mut map2 = BTreeMap::new();
        map2.insert("movie_name".to_string(), Value::String("Другой".to_string()));
        project.update_project_settings(map2);
        assert!(project.needs_writing());
    }
}
