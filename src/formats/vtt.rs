/*!
 * WebVTT (.vtt) format handler with metadata pass-through.
 *
 * Captures VTT-specific features (extended headers, NOTE and STYLE blocks,
 * cue identifiers, cue settings and whole-line voice tags) as metadata so
 * an untranslated file can be recomposed without semantic loss.
 */

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::SubtitleError;
use crate::subtitles::{Metadata, MetadataValue, SubtitleLine};

use super::{SubtitleData, SubtitleFileHandler};

static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(\d{2,}):)?(\d{2}):(\d{2})\.(\d{3})\s*-->\s*(?:(\d{2,}):)?(\d{2}):(\d{2})\.(\d{3})(.*)$",
    )
    .unwrap()
});

/// Matches a voice tag wrapping an entire cue: `<v.class Speaker>text</v>`
static VOICE_TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*<v((?:\.[\w-]+)*)(?:\s+([^>]+))?>(.*?)</v>\s*$").unwrap()
});

static STYLE_BLOCK_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*STYLE\s*$").unwrap());
static NOTE_BLOCK_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*NOTE(?:\s.*)?$").unwrap());

/// File handler for the WebVTT subtitle format
#[derive(Debug, Default)]
pub struct VttFileHandler;

impl SubtitleFileHandler for VttFileHandler {
    fn name(&self) -> &'static str {
        "vtt"
    }

    fn extension_priorities(&self) -> Vec<(&'static str, i32)> {
        vec![(".vtt", 10)]
    }

    fn parse_string(&self, content: &str) -> Result<SubtitleData, SubtitleError> {
        let content = content.replace("\r\n", "\n");
        let lines: Vec<&str> = content.lines().collect();

        let header_ok = lines
            .first()
            .map(|line| line.trim().trim_start_matches('\u{feff}').starts_with("WEBVTT"))
            .unwrap_or(false);
        if !header_ok {
            return Err(SubtitleError::parse("Invalid WebVTT file: missing WEBVTT header"));
        }

        let (mut metadata, header_end) = parse_file_header(&lines);
        let subtitle_lines = parse_cues(&lines, header_end, &mut metadata)?;

        Ok(SubtitleData {
            lines: subtitle_lines,
            metadata,
            start_line_number: None,
            detected_format: Some(".vtt".to_string()),
        })
    }

    fn compose(&self, data: &SubtitleData) -> Result<String, SubtitleError> {
        let mut output: Vec<String> = Vec::new();

        let header = data
            .metadata
            .get("header_text")
            .and_then(MetadataValue::as_text)
            .unwrap_or("WEBVTT");
        for header_line in header.split('\n') {
            output.push(header_line.to_string());
        }
        output.push(String::new());

        if let Some(MetadataValue::List(notes)) = data.metadata.get("vtt_notes") {
            for note in notes {
                if note.trim_start().starts_with("NOTE") {
                    output.push(note.clone());
                } else {
                    output.push("NOTE".to_string());
                    output.push(note.clone());
                }
                output.push(String::new());
            }
        }

        if let Some(MetadataValue::List(styles)) = data.metadata.get("vtt_styles") {
            for style in styles {
                output.push("STYLE".to_string());
                output.push(style.clone());
                output.push(String::new());
            }
        }

        for line in data.lines.iter().filter(|line| line.is_valid()) {
            if let Some(cue_id) = line.metadata.get("cue_id").and_then(MetadataValue::as_text) {
                output.push(cue_id.to_string());
            }

            let mut timing = format!(
                "{} --> {}",
                format_vtt_timestamp(line.start),
                format_vtt_timestamp(line.end)
            );
            if let Some(settings) = line.metadata.get("vtt_settings").and_then(MetadataValue::as_text) {
                timing.push(' ');
                timing.push_str(settings);
            }
            output.push(timing);

            output.push(restore_voice_tag(&line.text, &line.metadata));
            output.push(String::new());
        }

        Ok(output.join("\n"))
    }
}

/// Parse the WEBVTT header, which may span several lines before the first
/// blank line or content block. Returns metadata and the next line index.
fn parse_file_header(lines: &[&str]) -> (Metadata, usize) {
    let mut header_lines = vec![lines[0].trim().trim_start_matches('\u{feff}').to_string()];
    let mut index = 1;

    while index < lines.len() {
        let line = lines[index].trim();
        if line.is_empty() || is_content_line(line) {
            break;
        }
        header_lines.push(line.to_string());
        index += 1;
    }

    let mut metadata = Metadata::new();
    metadata.insert("header_text".to_string(), MetadataValue::Text(header_lines.join("\n")));
    (metadata, index)
}

fn is_content_line(line: &str) -> bool {
    TIMESTAMP_REGEX.is_match(line)
        || STYLE_BLOCK_REGEX.is_match(line)
        || NOTE_BLOCK_REGEX.is_match(line)
}

fn parse_cues(
    lines: &[&str],
    start: usize,
    metadata: &mut Metadata,
) -> Result<Vec<SubtitleLine>, SubtitleError> {
    let mut subtitle_lines = Vec::new();
    let mut notes: Vec<String> = Vec::new();
    let mut styles: Vec<String> = Vec::new();
    let mut index = start;
    let mut line_number = 1;

    while index < lines.len() {
        let line = lines[index].trim();

        if line.is_empty() {
            index += 1;
            continue;
        }

        if STYLE_BLOCK_REGEX.is_match(line) {
            let (block, next) = collect_block(lines, index + 1);
            if !block.is_empty() {
                styles.push(block);
            }
            index = next;
            continue;
        }

        if NOTE_BLOCK_REGEX.is_match(line) {
            let (mut block, next) = collect_block(lines, index + 1);
            if block.is_empty() {
                block = lines[index].to_string();
            } else {
                block = format!("{}\n{}", lines[index], block);
            }
            notes.push(block);
            index = next;
            continue;
        }

        match parse_single_cue(lines, index, line_number)? {
            Some((cue, next)) => {
                subtitle_lines.push(cue);
                line_number += 1;
                index = next;
            }
            None => index += 1,
        }
    }

    if !notes.is_empty() {
        metadata.insert("vtt_notes".to_string(), MetadataValue::List(notes));
    }
    if !styles.is_empty() {
        metadata.insert("vtt_styles".to_string(), MetadataValue::List(styles));
    }

    Ok(subtitle_lines)
}

/// Collect lines until a blank line or the start of another block
fn collect_block(lines: &[&str], start: usize) -> (String, usize) {
    let mut collected = Vec::new();
    let mut index = start;

    while index < lines.len() {
        let line = lines[index].trim();
        if line.is_empty() || STYLE_BLOCK_REGEX.is_match(line) || NOTE_BLOCK_REGEX.is_match(line) {
            break;
        }
        collected.push(lines[index].to_string());
        index += 1;
    }

    (collected.join("\n"), index)
}

fn parse_single_cue(
    lines: &[&str],
    start: usize,
    line_number: usize,
) -> Result<Option<(SubtitleLine, usize)>, SubtitleError> {
    let mut cue_id = None;
    let mut timing_index = start;

    // A line followed by a timestamp line is a cue identifier
    if start + 1 < lines.len() && TIMESTAMP_REGEX.is_match(lines[start + 1].trim()) {
        cue_id = Some(lines[start].trim().to_string());
        timing_index = start + 1;
    }

    let Some(captures) = TIMESTAMP_REGEX.captures(lines[timing_index].trim()) else {
        return Ok(None);
    };

    let start_time = parse_vtt_time(&captures, 1)?;
    let end_time = parse_vtt_time(&captures, 5)?;
    let settings = captures.get(9).map(|m| m.as_str().trim().to_string()).unwrap_or_default();

    let mut text_lines = Vec::new();
    let mut index = timing_index + 1;
    while index < lines.len() && !lines[index].trim().is_empty() {
        text_lines.push(lines[index].to_string());
        index += 1;
    }

    let raw_text = text_lines.join("\n");
    let (text, mut metadata) = extract_voice_tag(&raw_text);

    if let Some(cue_id) = cue_id {
        metadata.insert("cue_id".to_string(), MetadataValue::Text(cue_id));
    }
    if !settings.is_empty() {
        metadata.insert("vtt_settings".to_string(), MetadataValue::Text(settings));
    }

    let line = SubtitleLine::with_metadata(line_number, start_time, end_time, text, metadata);
    Ok(Some((line, index)))
}

fn parse_vtt_time(captures: &regex::Captures, group: usize) -> Result<Duration, SubtitleError> {
    let component = |idx: usize| -> u64 {
        captures
            .get(idx)
            .map(|m| m.as_str().parse().unwrap_or(0))
            .unwrap_or(0)
    };

    let hours = component(group);
    let minutes = component(group + 1);
    let seconds = component(group + 2);
    let millis = component(group + 3);

    if minutes >= 60 || seconds >= 60 {
        return Err(SubtitleError::parse("Invalid time components in VTT timestamp"));
    }

    Ok(Duration::from_millis(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis))
}

fn format_vtt_timestamp(duration: Duration) -> String {
    let total_ms = duration.as_millis() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1_000;
    let millis = total_ms % 1_000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

/// Strip a whole-line voice tag, recording classes and speaker in metadata
fn extract_voice_tag(text: &str) -> (String, Metadata) {
    let mut metadata = Metadata::new();

    if let Some(captures) = VOICE_TAG_REGEX.captures(text) {
        let classes = captures.get(1).map(|m| m.as_str()).unwrap_or("");
        if !classes.is_empty() {
            let class_list: Vec<String> = classes
                .split('.')
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
            metadata.insert("voice_classes".to_string(), MetadataValue::List(class_list));
        }

        if let Some(speaker) = captures.get(2) {
            metadata.insert("speaker".to_string(), MetadataValue::Text(speaker.as_str().trim().to_string()));
        }

        let content = captures.get(3).map(|m| m.as_str()).unwrap_or("");
        return (content.trim().to_string(), metadata);
    }

    (text.trim().to_string(), metadata)
}

/// Reattach the voice tag for output when the line carried one
fn restore_voice_tag(text: &str, metadata: &Metadata) -> String {
    let classes = match metadata.get("voice_classes") {
        Some(MetadataValue::List(list)) => list.clone(),
        _ => Vec::new(),
    };
    let speaker = metadata.get("speaker").and_then(MetadataValue::as_text).unwrap_or("");

    if classes.is_empty() && speaker.is_empty() {
        return text.to_string();
    }

    let mut tag = String::from("v");
    for class in &classes {
        tag.push('.');
        tag.push_str(class);
    }
    let speaker_part = if speaker.is_empty() { String::new() } else { format!(" {}", speaker) };

    format!("<{}{}>{}</v>", tag, speaker_part, text)
}
