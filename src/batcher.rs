/*!
 * Scene and batch segmentation.
 *
 * Walks the loaded lines in order, starting a new scene whenever the gap
 * to the previous line reaches the scene threshold and a new batch within
 * a scene on smaller gaps or size limits. A balance pass then merges
 * adjacent batches when the merged gap pattern is smoother than either
 * parent.
 */

use std::time::Duration;

use log::debug;

use crate::subtitles::{SubtitleBatch, SubtitleLine, SubtitleScene};

/// Configuration for the batcher
#[derive(Debug, Clone)]
pub struct BatcherOptions {
    /// A batch will not be split below this many lines
    pub min_batch_size: usize,
    /// No batch may exceed this many lines
    pub max_batch_size: usize,
    /// Gap that starts a new scene
    pub scene_threshold: Duration,
    /// Gap that may start a new batch within a scene
    pub batch_threshold: Duration,
}

impl Default for BatcherOptions {
    fn default() -> Self {
        Self {
            min_batch_size: 10,
            max_batch_size: 100,
            scene_threshold: Duration::from_secs(30),
            batch_threshold: Duration::from_secs(7),
        }
    }
}

/// Groups a flat line sequence into scenes containing batches
#[derive(Debug, Clone, Default)]
pub struct Batcher {
    options: BatcherOptions,
}

impl Batcher {
    /// Create a batcher with the given options
    pub fn new(options: BatcherOptions) -> Self {
        Batcher { options }
    }

    /// Segment lines into scenes and batches
    pub fn batch_lines(&self, lines: Vec<SubtitleLine>) -> Vec<SubtitleScene> {
        let mut scenes: Vec<SubtitleScene> = Vec::new();

        for line in lines {
            let gap = scenes
                .last()
                .and_then(|scene| scene.batches.last())
                .and_then(|batch| batch.originals.last())
                .map(|previous| line.gap_from(previous));

            let new_scene = match gap {
                None => true,
                Some(gap) => gap >= self.options.scene_threshold,
            };

            if new_scene {
                let scene_number = scenes.len() + 1;
                let mut scene = SubtitleScene::new(scene_number);
                scene.batches.push(SubtitleBatch::new(scene_number, 1));
                scenes.push(scene);
            }

            let scene = scenes.last_mut().expect("a scene was just ensured");
            let current = scene.batches.last().expect("a batch was just ensured");

            let split_batch = current.size() >= self.options.min_batch_size
                && (gap.is_some_and(|gap| gap >= self.options.batch_threshold)
                    || current.size() + 1 > self.options.max_batch_size);

            if split_batch {
                let batch_number = scene.batches.len() + 1;
                scene.batches.push(SubtitleBatch::new(scene.number, batch_number));
            }

            scene
                .batches
                .last_mut()
                .expect("a batch was just ensured")
                .originals
                .push(line);
        }

        for scene in &mut scenes {
            self.balance_scene(scene);
            for (index, batch) in scene.batches.iter_mut().enumerate() {
                batch.number = index + 1;
            }
        }

        debug!(
            "Batched lines into {} scenes / {} batches",
            scenes.len(),
            scenes.iter().map(|scene| scene.batches.len()).sum::<usize>()
        );

        scenes
    }

    /// Merge adjacent batches whose combined gap pattern is smoother than
    /// either parent, as long as the merged batch fits the size limit.
    /// Ties keep the existing boundary.
    fn balance_scene(&self, scene: &mut SubtitleScene) {
        let mut merged_any = true;
        while merged_any {
            merged_any = false;

            let mut index = 0;
            while index + 1 < scene.batches.len() {
                let left = &scene.batches[index];
                let right = &scene.batches[index + 1];

                if left.size() + right.size() > self.options.max_batch_size {
                    index += 1;
                    continue;
                }

                let left_variance = gap_variance(&left.gaps());
                let right_variance = gap_variance(&right.gaps());

                let mut combined = left.originals.clone();
                combined.extend(right.originals.iter().cloned());
                let combined_gaps: Vec<Duration> = combined
                    .windows(2)
                    .map(|pair| pair[1].gap_from(&pair[0]))
                    .collect();
                let combined_variance = gap_variance(&combined_gaps);

                if combined_variance < left_variance && combined_variance < right_variance {
                    let right = scene.batches.remove(index + 1);
                    scene.batches[index].originals.extend(right.originals);
                    merged_any = true;
                } else {
                    index += 1;
                }
            }
        }
    }
}

/// Variance of gap durations in seconds. Fewer than two gaps offer no
/// smoothness signal, treated as unbounded so tiny batches can merge.
fn gap_variance(gaps: &[Duration]) -> f64 {
    if gaps.len() < 2 {
        return f64::INFINITY;
    }

    let seconds: Vec<f64> = gaps.iter().map(|gap| gap.as_secs_f64()).collect();
    let mean = seconds.iter().sum::<f64>() / seconds.len() as f64;
    seconds.iter().map(|gap| (gap - mean).powi(2)).sum::<f64>() / seconds.len() as f64
}
