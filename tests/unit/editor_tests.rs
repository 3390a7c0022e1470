/*!
 * Editor atomicity: a failed edit leaves the tree and the dirty flag
 * exactly as they were on entry.
 */

use std::time::Duration;

use llm_subtrans::errors::SubtitleError;
use llm_subtrans::project::SubtitleProject;
use llm_subtrans::subtitles::{SubtitleBatch, SubtitleLine, SubtitleScene};

fn project_with_tree() -> SubtitleProject {
    let project = SubtitleProject::new(false);

    {
        let subtitles = project.subtitles();
        let mut guard = subtitles.lock();

        let mut scene = SubtitleScene::new(1);
        let mut batch = SubtitleBatch::new(1, 1);
        for number in 1..=4 {
            batch.originals.push(SubtitleLine::new(
                number,
                Duration::from_secs(number as u64 * 3),
                Duration::from_secs(number as u64 * 3 + 2),
                format!("line {}", number),
            ));
        }
        scene.batches.push(batch);
        guard.scenes.push(scene);
    }

    project
}

#[test]
fn test_successful_edit_sets_dirty_flag() {
    let project = project_with_tree();
    assert!(!project.needs_writing());

    project
        .edit(|editor| editor.set_line_translation(1, 1, 2, "deux"))
        .unwrap();

    assert!(project.needs_writing());
    let subtitles = project.subtitles();
    let guard = subtitles.lock();
    assert!(guard.scenes[0].batches[0].originals[1].has_translation());
}

#[test]
fn test_failed_edit_leaves_dirty_flag_and_tree_untouched() {
    let project = project_with_tree();
    let before = project.subtitles().lock().clone();

    let result = project.edit(|editor| {
        editor.set_line_translation(1, 1, 1, "un")?;
        // Unknown batch: the whole scope must roll back
        editor.set_line_translation(1, 9, 2, "deux")
    });

    assert!(matches!(result, Err(SubtitleError::InvariantViolation(_))));
    assert!(!project.needs_writing());
    assert_eq!(*project.subtitles().lock(), before);
}

#[test]
fn test_edit_emits_update_event() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let project = project_with_tree();
    let updates = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&updates);
    project.events.subscribe(move |event| {
        if matches!(event, llm_subtrans::TranslationEvent::Updated { .. }) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    project.edit(|editor| editor.update_scene_summary(1, "a summary")).unwrap();
    assert_eq!(updates.load(Ordering::SeqCst), 1);
}

#[test]
fn test_sanitise_runs_after_structural_edit() {
    let project = project_with_tree();

    project
        .edit(|editor| {
            editor.add_scene(SubtitleScene::new(5))?;
            let mut batch = SubtitleBatch::new(5, 3);
            batch.originals.push(SubtitleLine::new(
                10,
                Duration::from_secs(100),
                Duration::from_secs(102),
                "late line",
            ));
            editor.add_batch(5, batch)
        })
        .unwrap();

    let subtitles = project.subtitles();
    let guard = subtitles.lock();
    assert_eq!(guard.scenecount(), 2);
    assert_eq!(guard.scenes[1].number, 2);
    assert_eq!(guard.scenes[1].batches[0].number, 1);
    assert_eq!(guard.scenes[1].batches[0].scene, 2);
}
