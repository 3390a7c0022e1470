use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::batch::SubtitleBatch;

/// An ordered run of batches that share narrative context.
///
/// A scene boundary is a gap between consecutive lines exceeding the
/// configured scene threshold; batch numbers are contiguous from 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleScene {
    /// 1-based scene number
    pub number: usize,

    /// Rolling summary, updated after each batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// The scene's batches
    pub batches: Vec<SubtitleBatch>,
}

impl SubtitleScene {
    /// Create an empty scene
    pub fn new(number: usize) -> Self {
        SubtitleScene { number, summary: None, batches: Vec::new() }
    }

    /// Total number of lines across the scene's batches
    pub fn linecount(&self) -> usize {
        self.batches.iter().map(|batch| batch.size()).sum()
    }

    /// Start instant of the first line in the scene
    pub fn start(&self) -> Option<Duration> {
        self.batches.first().and_then(|batch| batch.start())
    }

    /// End instant of the last line in the scene
    pub fn end(&self) -> Option<Duration> {
        self.batches.last().and_then(|batch| batch.end())
    }

    /// Whether any batch has translations
    pub fn any_translated(&self) -> bool {
        self.batches.iter().any(|batch| batch.any_translated())
    }

    /// Whether every batch is fully translated
    pub fn all_translated(&self) -> bool {
        !self.batches.is_empty() && self.batches.iter().all(|batch| batch.all_translated())
    }

    /// Look up a batch by number
    pub fn get_batch(&self, number: usize) -> Option<&SubtitleBatch> {
        self.batches.iter().find(|batch| batch.number == number)
    }

    /// Look up a batch by number, mutably
    pub fn get_batch_mut(&mut self, number: usize) -> Option<&mut SubtitleBatch> {
        self.batches.iter_mut().find(|batch| batch.number == number)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::subtitles::line::SubtitleLine;

    use super::*;

    fn scene_with_batches() -> SubtitleScene {
        let mut scene = SubtitleScene::new(1);
        for b in 1..=2 {
            let mut batch = SubtitleBatch::new(1, b);
            for i in 0..3 {
                let number = (b - 1) * 3 + i + 1;
                batch.originals.push(SubtitleLine::new(
                    number,
                    Duration::from_secs(number as u64),
                    Duration::from_secs(number as u64 + 1),
                    format!("line {}", number),
                ));
            }
            scene.batches.push(batch);
        }
        scene
    }

    #[test]
    fn test_linecount_sums_batches() {
        let scene = scene_with_batches();
        assert_eq!(scene.linecount(), 6);
    }

    #[test]
    fn test_all_translated_spans_batches() {
        let mut scene = scene_with_batches();
        assert!(!scene.all_translated());

        for batch in &mut scene.batches {
            let numbers: Vec<usize> = batch.originals.iter().map(|l| l.number).collect();
            for number in numbers {
                batch.set_translation(number, "done");
            }
        }
        assert!(scene.all_translated());
    }

    #[test]
    fn test_get_batch_by_number() {
        let scene = scene_with_batches();
        assert!(scene.get_batch(2).is_some());
        assert!(scene.get_batch(3).is_none());
    }
}
