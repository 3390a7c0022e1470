/*!
 * The subtitle data model.
 *
 * A strictly hierarchical tree: `Subtitles` own scenes, scenes own batches,
 * batches own lines. All mutation is routed through the scoped
 * `SubtitleEditor` so invariants hold and observers can be notified
 * coherently.
 */

pub mod batch;
pub mod editor;
pub mod file;
pub mod line;
pub mod metadata;
pub mod scene;

pub use batch::{BatchContext, SubtitleBatch};
pub use editor::{BatchTranslationUpdate, SubtitleEditor};
pub use file::Subtitles;
pub use line::SubtitleLine;
pub use metadata::{Colour, Metadata, MetadataValue};
pub use scene::SubtitleScene;
