/*!
 * Segmentation invariants over generated line sequences.
 */

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use llm_subtrans::batcher::{Batcher, BatcherOptions};
use llm_subtrans::subtitles::SubtitleLine;

fn random_lines(rng: &mut StdRng, count: usize) -> Vec<SubtitleLine> {
    let mut lines = Vec::with_capacity(count);
    let mut cursor_ms: u64 = 0;

    for number in 1..=count {
        // Mostly small gaps, occasionally a scene-sized pause
        let gap_ms = if rng.random_bool(0.08) {
            rng.random_range(31_000..120_000)
        } else {
            rng.random_range(100..9_000)
        };
        cursor_ms += gap_ms;

        let duration_ms = rng.random_range(500..4_000);
        lines.push(SubtitleLine::new(
            number,
            Duration::from_millis(cursor_ms),
            Duration::from_millis(cursor_ms + duration_ms),
            format!("line {}", number),
        ));
        cursor_ms += duration_ms;
    }

    lines
}

fn options() -> BatcherOptions {
    BatcherOptions {
        min_batch_size: 4,
        max_batch_size: 12,
        scene_threshold: Duration::from_secs(30),
        batch_threshold: Duration::from_secs(6),
    }
}

#[test]
fn test_every_line_appears_in_exactly_one_batch() {
    let mut rng = StdRng::seed_from_u64(42);

    for case in 0..20 {
        let count = 30 + case * 7;
        let lines = random_lines(&mut rng, count);
        let scenes = Batcher::new(options()).batch_lines(lines);

        let mut numbers: Vec<usize> = scenes
            .iter()
            .flat_map(|scene| scene.batches.iter())
            .flat_map(|batch| batch.originals.iter())
            .map(|line| line.number)
            .collect();

        assert_eq!(numbers.len(), count, "case {}: line lost or duplicated", case);
        numbers.sort_unstable();
        numbers.dedup();
        assert_eq!(numbers.len(), count, "case {}: duplicate line numbers", case);
    }
}

#[test]
fn test_batch_first_line_numbers_strictly_increase() {
    let mut rng = StdRng::seed_from_u64(7);
    let lines = random_lines(&mut rng, 200);
    let scenes = Batcher::new(options()).batch_lines(lines);

    let firsts: Vec<usize> = scenes
        .iter()
        .flat_map(|scene| scene.batches.iter())
        .filter_map(|batch| batch.first_line_number())
        .collect();

    assert!(!firsts.is_empty());
    assert!(
        firsts.windows(2).all(|pair| pair[0] < pair[1]),
        "first line numbers must strictly increase: {:?}",
        firsts
    );
}

#[test]
fn test_no_batch_exceeds_max_size() {
    let mut rng = StdRng::seed_from_u64(1234);

    for case in 0..10 {
        let lines = random_lines(&mut rng, 150);
        let scenes = Batcher::new(options()).batch_lines(lines);

        for scene in &scenes {
            for batch in &scene.batches {
                assert!(
                    batch.size() <= options().max_batch_size,
                    "case {}: batch of {} lines exceeds the maximum",
                    case,
                    batch.size()
                );
            }
        }
    }
}

#[test]
fn test_scene_numbers_are_contiguous_from_one() {
    let mut rng = StdRng::seed_from_u64(99);
    let lines = random_lines(&mut rng, 120);
    let scenes = Batcher::new(options()).batch_lines(lines);

    for (index, scene) in scenes.iter().enumerate() {
        assert_eq!(scene.number, index + 1);
        for (batch_index, batch) in scene.batches.iter().enumerate() {
            assert_eq!(batch.number, batch_index + 1);
            assert_eq!(batch.scene, scene.number);
        }
    }
}

#[test]
fn test_scene_gaps_exceed_threshold() {
    let mut rng = StdRng::seed_from_u64(5);
    let lines = random_lines(&mut rng, 100);
    let scenes = Batcher::new(options()).batch_lines(lines.clone());

    // The first line of each scene after the first must sit at least the
    // scene threshold after the previous line's end
    let mut previous_end: Option<Duration> = None;
    for scene in &scenes {
        let first = &scene.batches[0].originals[0];
        if let Some(end) = previous_end {
            assert!(
                first.start.saturating_sub(end) >= options().scene_threshold,
                "scene {} does not start after a scene-sized gap",
                scene.number
            );
        }
        previous_end = scene.batches.last().and_then(|batch| batch.end());
    }
}
