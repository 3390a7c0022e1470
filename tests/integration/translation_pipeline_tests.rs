/*!
 * End-to-end pipeline tests against loopback clients.
 */

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use llm_subtrans::batcher::BatcherOptions;
use llm_subtrans::errors::{ProviderError, TranslationError};
use llm_subtrans::project::SubtitleProject;
use llm_subtrans::providers::mock::LoopbackClient;
use llm_subtrans::translation::{
    SceneTranslator, SceneTranslatorOptions, TranslationEvent,
};

use crate::common;

fn settings_map(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(key, value)| (key.to_string(), value.clone())).collect()
}

fn pipeline_options(max_batch_size: usize) -> SceneTranslatorOptions {
    let mut options = SceneTranslatorOptions::default();
    options.batcher = BatcherOptions {
        min_batch_size: 10,
        max_batch_size,
        scene_threshold: Duration::from_secs(30),
        batch_threshold: Duration::from_secs(7),
    };
    options
}

/// Scenario: a fresh 64-line Chinese SRT in two scenes, translated
/// sequentially against a loopback client.
#[tokio::test]
async fn test_fresh_srt_two_scenes_sequential() {
    common::init_test_logging();
    let temp = common::create_temp_dir().unwrap();
    let srt_path =
        common::create_test_file(temp.path(), "movie.srt", &common::chinese_srt_two_scenes()).unwrap();

    let mut project = SubtitleProject::new(true);
    project.initialise_project(&srt_path, None, false).unwrap();
    project.update_project_settings(settings_map(&[
        ("target_language", json!("English")),
        ("provider", json!("Loopback")),
        ("model", json!("loopback")),
    ]));
    project.update_output_path(None, None).unwrap();

    let translator = SceneTranslator::new(Arc::new(LoopbackClient::echo()), pipeline_options(100));
    project.translate_subtitles(&translator).await.unwrap();

    // The project file was written
    assert!(temp.path().join("movie.subtrans").exists());

    {
        let subtitles = project.subtitles();
        let guard = subtitles.lock();
        assert!(guard.scenecount() >= 2, "expected at least two scenes");
        assert_eq!(guard.linecount(), 64);
        assert!(guard.all_translated(), "every line must have a translation");
    }

    // The output file matches the input in timing and line count
    let output_path = temp.path().join("movie.english.srt");
    assert!(output_path.exists());

    let registry = llm_subtrans::formats::FormatRegistry::with_builtin_handlers();
    let handler = registry.create_handler(".srt").unwrap();
    let input = handler.parse_string(&common::chinese_srt_two_scenes()).unwrap();
    let output = handler.parse_file(&output_path).unwrap();

    assert_eq!(input.lines.len(), output.lines.len());
    for (original, translated) in input.lines.iter().zip(output.lines.iter()) {
        assert_eq!(original.start, translated.start);
        assert_eq!(original.end, translated.end);
        assert_eq!(original.text, translated.text, "loopback echoes the original text");
    }
}

/// Scenario: the first response for each batch drops the final translation;
/// the repair retry completes it.
#[tokio::test]
async fn test_misalignment_retry_recovers() {
    let temp = common::create_temp_dir().unwrap();
    let srt_path =
        common::create_test_file(temp.path(), "movie.srt", &common::chinese_srt_two_scenes()).unwrap();

    let mut project = SubtitleProject::new(false);
    project.initialise_project(&srt_path, None, false).unwrap();
    project.update_project_settings(settings_map(&[("target_language", json!("English"))]));
    project.update_output_path(None, None).unwrap();

    let translator =
        SceneTranslator::new(Arc::new(LoopbackClient::misaligned_once()), pipeline_options(100));

    let batch_events: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&batch_events);
    translator.events.subscribe(move |event| {
        if let TranslationEvent::BatchTranslated(batch) = event {
            sink.lock().push((batch.scene, batch.batch));
        }
    });

    project.translate_subtitles(&translator).await.unwrap();

    // Each batch appears in exactly one batch_translated event
    let mut events = batch_events.lock().clone();
    let total = events.len();
    events.sort_unstable();
    events.dedup();
    assert_eq!(events.len(), total, "a batch was reported twice");

    let subtitles = project.subtitles();
    let guard = subtitles.lock();
    assert!(guard.all_translated());
    for scene in &guard.scenes {
        for batch in &scene.batches {
            assert!(
                !batch.errors.is_empty(),
                "the repaired batch keeps a record of the first attempt's problem"
            );
        }
    }
}

/// Scenario: an authentication failure on the last batch. Everything before
/// it is translated and saved; the run reports the failure.
#[tokio::test]
async fn test_fatal_provider_error_preserves_partial_results() {
    let temp = common::create_temp_dir().unwrap();
    let srt_path =
        common::create_test_file(temp.path(), "movie.srt", &common::chinese_srt_two_scenes()).unwrap();

    let mut project = SubtitleProject::new(true);
    project.initialise_project(&srt_path, None, false).unwrap();
    project.update_project_settings(settings_map(&[("target_language", json!("English"))]));
    project.update_output_path(None, None).unwrap();

    // max_batch_size 20 gives two batches per 32-line scene; the fourth
    // request is the second batch of scene 2
    let translator =
        SceneTranslator::new(Arc::new(LoopbackClient::auth_failure_on(4)), pipeline_options(20));

    let result = project.translate_subtitles(&translator).await;
    assert!(matches!(
        result,
        Err(TranslationError::Provider(ProviderError::AuthenticationError(_)))
    ));

    {
        let subtitles = project.subtitles();
        let guard = subtitles.lock();
        assert_eq!(guard.scenecount(), 2);
        assert_eq!(guard.scenes[0].batches.len(), 2);

        assert!(guard.scenes[0].all_translated(), "scene 1 fully translated");
        assert!(guard.scenes[1].batches[0].all_translated(), "scene 2 batch 1 translated");

        let failed = &guard.scenes[1].batches[1];
        assert!(!failed.any_translated(), "the failed batch has no translation");
        assert!(
            failed.errors.iter().any(|error| error.contains("Authentication")),
            "the failed batch carries the fatal error: {:?}",
            failed.errors
        );
    }

    // Partial results were saved
    assert!(temp.path().join("movie.subtrans").exists());
    assert!(temp.path().join("movie.english.srt").exists());
}

/// Sequential mode fires events in scene-then-batch order
#[tokio::test]
async fn test_sequential_event_ordering() {
    let temp = common::create_temp_dir().unwrap();
    let srt_path =
        common::create_test_file(temp.path(), "movie.srt", &common::chinese_srt_two_scenes()).unwrap();

    let mut project = SubtitleProject::new(false);
    project.initialise_project(&srt_path, None, false).unwrap();
    project.update_output_path(None, None).unwrap();

    let translator = SceneTranslator::new(Arc::new(LoopbackClient::echo()), pipeline_options(20));

    let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&order);
    translator.events.subscribe(move |event| match event {
        TranslationEvent::BatchTranslated(batch) => {
            sink.lock().push(format!("batch {}.{}", batch.scene, batch.batch));
        }
        TranslationEvent::SceneTranslated(scene) => {
            sink.lock().push(format!("scene {}", scene.scene));
        }
        _ => {}
    });

    project.translate_subtitles(&translator).await.unwrap();

    assert_eq!(
        *order.lock(),
        vec![
            "batch 1.1",
            "batch 1.2",
            "scene 1",
            "batch 2.1",
            "batch 2.2",
            "scene 2",
        ]
    );
}

/// Parallel mode translates everything; per-batch ordering still holds
/// (batch events precede their scene's event)
#[tokio::test]
async fn test_parallel_mode_translates_everything() {
    let temp = common::create_temp_dir().unwrap();
    let srt_path =
        common::create_test_file(temp.path(), "movie.srt", &common::chinese_srt_two_scenes()).unwrap();

    let mut project = SubtitleProject::new(false);
    project.initialise_project(&srt_path, None, false).unwrap();
    project.update_output_path(None, None).unwrap();

    let mut options = pipeline_options(20);
    options.parallel = true;
    options.worker_limit = 4;

    let translator = SceneTranslator::new(Arc::new(LoopbackClient::echo()), options);

    let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&order);
    translator.events.subscribe(move |event| match event {
        TranslationEvent::BatchTranslated(batch) => {
            sink.lock().push(format!("batch {}.{}", batch.scene, batch.batch));
        }
        TranslationEvent::SceneTranslated(scene) => {
            sink.lock().push(format!("scene {}", scene.scene));
        }
        _ => {}
    });

    project.translate_subtitles(&translator).await.unwrap();

    assert!(project.all_translated());

    // For each scene, every batch event precedes the scene event
    let events = order.lock().clone();
    for scene in 1..=2 {
        let scene_position = events.iter().position(|entry| entry == &format!("scene {}", scene));
        let scene_position = scene_position.expect("scene event missing");
        for batch in 1..=2 {
            let batch_position = events
                .iter()
                .position(|entry| entry == &format!("batch {}.{}", scene, batch))
                .expect("batch event missing");
            assert!(batch_position < scene_position);
        }
    }
}

/// Parallel mode is refused when the provider reports a rate limit
#[tokio::test]
async fn test_parallel_mode_refused_for_rate_limited_provider() {
    let temp = common::create_temp_dir().unwrap();
    let srt_path =
        common::create_test_file(temp.path(), "movie.srt", &common::chinese_srt_two_scenes()).unwrap();

    let mut project = SubtitleProject::new(false);
    project.initialise_project(&srt_path, None, false).unwrap();
    project.update_output_path(None, None).unwrap();

    let client = LoopbackClient::echo().with_rate_limit(Duration::from_millis(50));
    let mut options = pipeline_options(100);
    options.parallel = true;

    let translator = SceneTranslator::new(Arc::new(client), options);
    let result = project.translate_subtitles(&translator).await;
    assert!(result.is_err());
}

/// The prompt produced for a batch, fed to the loopback client, parses
/// back to translations equal to the originals, soft breaks included
#[tokio::test]
async fn test_prompt_parser_roundtrip_with_breaks() {
    let srt = "1\n00:00:01,000 --> 00:00:03,000\nTwo display\nlines here\n\n2\n00:00:05,000 --> 00:00:07,000\nA word<wbr>break line\n\n";

    let temp = common::create_temp_dir().unwrap();
    let srt_path = common::create_test_file(temp.path(), "short.srt", srt).unwrap();

    let mut project = SubtitleProject::new(false);
    project.initialise_project(&srt_path, None, false).unwrap();
    project.update_output_path(None, None).unwrap();

    let mut options = pipeline_options(100);
    options.batcher.min_batch_size = 1;

    let translator = SceneTranslator::new(Arc::new(LoopbackClient::echo()), options);
    project.translate_subtitles(&translator).await.unwrap();

    let subtitles = project.subtitles();
    let guard = subtitles.lock();
    for line in guard.all_lines() {
        assert_eq!(line.translation.as_deref(), Some(line.text.as_str()));
    }
}

/// Aborting before the run starts translates nothing and reports the abort
#[tokio::test]
async fn test_abort_stops_translation() {
    let temp = common::create_temp_dir().unwrap();
    let srt_path =
        common::create_test_file(temp.path(), "movie.srt", &common::chinese_srt_two_scenes()).unwrap();

    let mut project = SubtitleProject::new(false);
    project.initialise_project(&srt_path, None, false).unwrap();
    project.update_output_path(None, None).unwrap();

    let translator = SceneTranslator::new(Arc::new(LoopbackClient::echo()), pipeline_options(100));
    translator.abort_flag().store(true, std::sync::atomic::Ordering::SeqCst);

    let result = project.translate_subtitles(&translator).await;
    assert!(matches!(result, Err(TranslationError::Aborted)));
    assert!(!project.any_translated());
}
