/*!
 * Project file serialisation.
 *
 * The whole subtitle tree (scenes, batches, lines, settings and file
 * metadata) is written as pretty-printed JSON with Unicode preserved
 * literally. Timestamps are stored as canonical strings and colours as
 * `{r,g,b,a}` objects; durations are recomputed from the timestamps on
 * decode. After decoding, no format handler is assigned; the real handler
 * is selected lazily from the output path.
 */

use std::path::Path;

use log::info;

use crate::errors::SubtitleError;
use crate::subtitles::Subtitles;

/// Extension for project files
pub const PROJECT_EXTENSION: &str = ".subtrans";

/// Extension suffix for project backups
pub const BACKUP_SUFFIX: &str = "-backup";

/// Encode the subtitle tree as pretty-printed JSON
pub fn encode_project(subtitles: &Subtitles) -> Result<String, SubtitleError> {
    serde_json::to_string_pretty(subtitles)
        .map_err(|e| SubtitleError::ProjectError(format!("Failed to encode project: {}", e)))
}

/// Decode a project JSON document and sanitise the tree
pub fn decode_project(content: &str) -> Result<Subtitles, SubtitleError> {
    let mut subtitles: Subtitles = serde_json::from_str(content)
        .map_err(|e| SubtitleError::parse(format!("Failed to decode project JSON: {}", e)))?;

    subtitles.sanitise();
    Ok(subtitles)
}

/// Write the project file (UTF-8, LF line endings)
pub fn write_project_file(subtitles: &Subtitles, path: &Path) -> Result<(), SubtitleError> {
    let json = encode_project(subtitles)?;
    std::fs::write(path, json)?;
    info!("Project data written to {}", path.display());
    Ok(())
}

/// Read a project file from disk
pub fn read_project_file(path: &Path) -> Result<Subtitles, SubtitleError> {
    let content = std::fs::read_to_string(path)?;
    decode_project(&content)
}
