/*!
 * Shared helper functions: path derivation, timestamp formatting,
 * line-break sentinels, right-to-left detection and encoding-aware
 * file reading.
 */

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use encoding_rs::Encoding;

use crate::errors::SubtitleError;

/// Sentinel token for a soft line break (a word-break hint) in internal text.
/// Hard line breaks are plain `\n`.
pub const SOFT_BREAK: &str = "<wbr>";

/// Unicode right-to-left embedding marker pair
pub const RTL_START: char = '\u{202b}';
pub const RTL_END: char = '\u{202c}';

/// Format a timestamp in milliseconds to the canonical form (HH:MM:SS,mmm)
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

/// Parse a timestamp to milliseconds, accepting `,` or `.` before the millis
pub fn parse_timestamp(timestamp: &str) -> Result<u64, SubtitleError> {
    let parts: Vec<&str> = timestamp.trim().split(|c| c == ':' || c == ',' || c == '.').collect();

    if parts.len() != 4 {
        return Err(SubtitleError::parse(format!("Invalid timestamp format: {}", timestamp)));
    }

    let hours: u64 = parts[0].trim().parse()
        .map_err(|_| SubtitleError::parse(format!("Invalid hours in timestamp: {}", timestamp)))?;
    let minutes: u64 = parts[1].parse()
        .map_err(|_| SubtitleError::parse(format!("Invalid minutes in timestamp: {}", timestamp)))?;
    let seconds: u64 = parts[2].parse()
        .map_err(|_| SubtitleError::parse(format!("Invalid seconds in timestamp: {}", timestamp)))?;
    let millis: u64 = parts[3].parse()
        .map_err(|_| SubtitleError::parse(format!("Invalid milliseconds in timestamp: {}", timestamp)))?;

    if minutes >= 60 || seconds >= 60 || millis >= 1000 {
        return Err(SubtitleError::parse(format!("Invalid time components in timestamp: {}", timestamp)));
    }

    Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
}

/// Derive the output path for translated subtitles as
/// `basename.<language>.<extension>` next to the source file.
pub fn get_output_path(filepath: &Path, language: Option<&str>, extension: Option<&str>) -> PathBuf {
    let directory = filepath.parent().unwrap_or(Path::new(""));
    let basename = filepath.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();

    let target_extension = match extension {
        Some(ext) if ext.starts_with('.') => ext.to_string(),
        Some(ext) => format!(".{}", ext),
        None => filepath.extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_else(|| ".srt".to_string()),
    };

    let language = language.unwrap_or("translated").to_lowercase();
    let suffix = format!(".{}", language);
    let basename = if basename.ends_with(&suffix) { basename } else { format!("{}{}", basename, suffix) };

    directory.join(format!("{}{}", basename, target_extension))
}

/// Resolve a language code or name to a display name for prompts and paths.
/// Accepts ISO 639-1 ("en"), ISO 639-3 ("eng") or an English name ("English").
pub fn get_language_name(code_or_name: &str) -> Result<String> {
    let trimmed = code_or_name.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Language code cannot be empty"));
    }

    if let Some(language) = isolang::Language::from_639_1(&trimmed.to_lowercase()) {
        return Ok(language.to_name().to_string());
    }
    if let Some(language) = isolang::Language::from_639_3(&trimmed.to_lowercase()) {
        return Ok(language.to_name().to_string());
    }
    if let Some(language) = isolang::Language::from_name(trimmed) {
        return Ok(language.to_name().to_string());
    }

    // Unrecognised values pass through, the provider may still understand them
    Ok(trimmed.to_string())
}

/// Whether the text is predominantly right-to-left (Hebrew or Arabic ranges)
pub fn is_right_to_left(text: &str) -> bool {
    let mut rtl = 0usize;
    let mut ltr = 0usize;

    for c in text.chars() {
        match c {
            '\u{0590}'..='\u{05FF}'
            | '\u{0600}'..='\u{06FF}'
            | '\u{0750}'..='\u{077F}'
            | '\u{FB50}'..='\u{FDFF}'
            | '\u{FE70}'..='\u{FEFF}' => rtl += 1,
            _ if c.is_alphabetic() => ltr += 1,
            _ => {}
        }
    }

    rtl > ltr
}

/// Wrap a line in RTL embedding markers unless it is already marked
pub fn add_rtl_markers(text: &str) -> String {
    if text.starts_with(RTL_START) {
        return text.to_string();
    }
    format!("{}{}{}", RTL_START, text, RTL_END)
}

/// Read a text file honouring the `DEFAULT_ENCODING` environment variable.
/// Defaults to UTF-8; a BOM in the file always wins over the configured label.
pub fn read_text_file(path: &Path) -> Result<String, SubtitleError> {
    let bytes = std::fs::read(path)?;

    let encoding = env::var("DEFAULT_ENCODING")
        .ok()
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(encoding_rs::UTF_8);

    let (decoded, _, had_errors) = encoding.decode(&bytes);
    if had_errors {
        return Err(SubtitleError::parse(format!(
            "File {} is not valid {}",
            path.display(),
            encoding.name()
        )));
    }

    Ok(decoded.into_owned())
}

/// Count hard and soft line breaks in internal text
pub fn count_breaks(text: &str) -> (usize, usize) {
    let hard = text.matches('\n').count();
    let soft = text.matches(SOFT_BREAK).count();
    (hard, soft)
}
