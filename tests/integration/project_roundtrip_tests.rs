/*!
 * Project persistence: save/load fidelity, backups, resume after a
 * partial run, and the ASS round-trip.
 */

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};

use llm_subtrans::batcher::Batcher;
use llm_subtrans::project::serialiser;
use llm_subtrans::project::SubtitleProject;
use llm_subtrans::providers::mock::LoopbackClient;
use llm_subtrans::translation::{SceneScope, SceneTranslator, SceneTranslatorOptions, TranslationScope};

use crate::common;

fn settings_map(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(key, value)| (key.to_string(), value.clone())).collect()
}

/// Save/load preserves counts, line content, translations and settings
#[tokio::test]
async fn test_save_load_roundtrip_preserves_everything() {
    let temp = common::create_temp_dir().unwrap();
    let srt_path =
        common::create_test_file(temp.path(), "movie.srt", &common::chinese_srt_two_scenes()).unwrap();

    let mut project = SubtitleProject::new(true);
    project.initialise_project(&srt_path, None, false).unwrap();
    project.update_project_settings(settings_map(&[
        ("target_language", json!("English")),
        ("movie_name", json!("试验")),
        ("names", json!(["Anna", "Boris"])),
        ("substitutions", json!(["colour::color"])),
        ("include_original", json!(true)),
    ]));
    project.update_output_path(None, None).unwrap();

    let translator = SceneTranslator::new(Arc::new(LoopbackClient::echo()), SceneTranslatorOptions::default());
    project.translate_subtitles(&translator).await.unwrap();

    let saved = {
        let subtitles = project.subtitles();
        let guard = subtitles.lock();
        guard.clone()
    };

    let reloaded = serialiser::read_project_file(&temp.path().join("movie.subtrans")).unwrap();

    assert_eq!(reloaded.linecount(), saved.linecount());
    assert_eq!(reloaded.scenecount(), saved.scenecount());
    assert_eq!(reloaded.settings, saved.settings);

    for (original, restored) in saved.all_lines().zip(reloaded.all_lines()) {
        assert_eq!(original.number, restored.number);
        assert_eq!(original.start, restored.start);
        assert_eq!(original.end, restored.end);
        assert_eq!(original.text, restored.text);
        assert_eq!(original.translation, restored.translation);
        assert_eq!(original.metadata, restored.metadata);
    }
}

/// Scenario: translate only scene 1, reopen the project, resume. The
/// resumed run submits only the untranslated batches and the final state
/// matches a full run.
#[tokio::test]
async fn test_resume_after_partial_run() {
    let temp = common::create_temp_dir().unwrap();
    let srt_path =
        common::create_test_file(temp.path(), "movie.srt", &common::chinese_srt_two_scenes()).unwrap();

    // First run: scene 1 only (as if the run was aborted between scenes)
    {
        let mut project = SubtitleProject::new(true);
        project.initialise_project(&srt_path, None, false).unwrap();
        project.update_project_settings(settings_map(&[("target_language", json!("English"))]));
        project.update_output_path(None, None).unwrap();

        let mut scope = TranslationScope::new();
        scope.insert(1, SceneScope::default());
        let mut options = SceneTranslatorOptions::default();
        options.scope = Some(scope);

        let translator = SceneTranslator::new(Arc::new(LoopbackClient::echo()), options);
        project.translate_subtitles(&translator).await.unwrap();

        assert!(project.any_translated());
        assert!(!project.all_translated());
    }

    // Second run: reopen the project (reload=false) and translate the rest
    let mut project = SubtitleProject::new(true);
    project.initialise_project(&srt_path, None, false).unwrap();
    assert!(project.is_existing_project(), "the project file is picked up");

    {
        let subtitles = project.subtitles();
        let guard = subtitles.lock();
        assert!(guard.scenes[0].all_translated(), "scene 1 translations are intact");
        assert!(!guard.scenes[1].any_translated());
    }

    let client = Arc::new(LoopbackClient::echo());
    let translator = SceneTranslator::new(
        Arc::clone(&client) as Arc<dyn llm_subtrans::providers::TranslationClient>,
        SceneTranslatorOptions::default(),
    );
    project.translate_subtitles(&translator).await.unwrap();

    assert!(project.all_translated());
    assert_eq!(
        client.requests_made(),
        1,
        "only the untranslated batch of scene 2 is resubmitted"
    );
}

/// Opening an existing project writes a backup before any mutation
#[tokio::test]
async fn test_backup_written_once_on_open() {
    let temp = common::create_temp_dir().unwrap();
    let srt_path =
        common::create_test_file(temp.path(), "movie.srt", &common::chinese_srt_two_scenes()).unwrap();

    {
        let mut project = SubtitleProject::new(true);
        project.initialise_project(&srt_path, None, false).unwrap();
        project.update_project_settings(settings_map(&[("target_language", json!("English"))]));
        project.update_output_path(None, None).unwrap();

        let translator =
            SceneTranslator::new(Arc::new(LoopbackClient::echo()), SceneTranslatorOptions::default());
        project.translate_subtitles(&translator).await.unwrap();
    }

    let backup_path = temp.path().join("movie.subtrans-backup");
    assert!(!backup_path.exists(), "no backup for a fresh project");

    // Reopen: the backup is written from the existing project content
    let mut project = SubtitleProject::new(true);
    project.initialise_project(&srt_path, None, false).unwrap();
    assert!(backup_path.exists());

    let backup = serialiser::read_project_file(&backup_path).unwrap();
    assert!(backup.all_translated(), "the backup holds the pre-mutation state");
    drop(project);
}

/// Scenario: ASS round-trip with styles and colours, no translation
#[test]
fn test_ass_project_roundtrip() {
    let temp = common::create_temp_dir().unwrap();
    let ass_path = common::create_test_file(temp.path(), "movie.ass", common::SAMPLE_ASS).unwrap();

    let mut project = SubtitleProject::new(true);
    project.initialise_project(&ass_path, None, false).unwrap();

    // Batch without translating so the tree can be persisted
    {
        let subtitles = project.subtitles();
        let originals = {
            let guard = subtitles.lock();
            guard.originals.clone()
        };
        project
            .edit(|editor| {
                editor.replace_scenes(Batcher::default().batch_lines(originals));
                Ok(())
            })
            .unwrap();
    }
    project.save_project_file().unwrap();

    let reloaded = serialiser::read_project_file(&temp.path().join("movie.subtrans")).unwrap();

    // Compose both trees and compare the styles sections byte for byte
    let registry = llm_subtrans::formats::FormatRegistry::with_builtin_handlers();
    let handler = registry.create_handler(".ass").unwrap();

    let original_composed = {
        let subtitles = project.subtitles();
        let guard = subtitles.lock();
        handler.compose(&guard.build_original_data()).unwrap()
    };
    let reloaded_composed = handler.compose(&reloaded.build_original_data()).unwrap();

    let styles_section = |text: &str| -> String {
        text.lines()
            .skip_while(|line| !line.contains("Styles]"))
            .take_while(|line| !line.trim().is_empty())
            .collect::<Vec<&str>>()
            .join("\n")
    };

    assert_eq!(styles_section(&original_composed), styles_section(&reloaded_composed));

    // Colours preserved exactly
    assert!(reloaded_composed.contains("&H00FFE0C0"));
    assert!(reloaded_composed.contains("&H0000FFFF"));

    // Soft break sentinels restored to \n on compose
    assert!(reloaded_composed.contains("A line with\\na soft break"));
    assert!(reloaded_composed.contains("Hard\\Nbreak line"));
}
