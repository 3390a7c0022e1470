/*!
 * SubRip (.srt) format handler.
 *
 * SRT has minimal file-level metadata; the only extra carried per line is
 * the proprietary text some tools append after the timing line. Hard line
 * breaks are literal newlines, so no break conversion is needed.
 */

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::SubtitleError;
use crate::helpers;
use crate::subtitles::{MetadataValue, SubtitleLine};

use super::{SubtitleData, SubtitleFileHandler};

/// Regex for an SRT timing line, capturing the proprietary tail
static TIMING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{2}:\d{2}:\d{2}[,.]\d{3})\s*-->\s*(\d{2}:\d{2}:\d{2}[,.]\d{3})[ \t]*(.*)$",
    )
    .unwrap()
});

/// File handler for the SubRip subtitle format
#[derive(Debug, Default)]
pub struct SrtFileHandler;

impl SubtitleFileHandler for SrtFileHandler {
    fn name(&self) -> &'static str {
        "srt"
    }

    fn extension_priorities(&self) -> Vec<(&'static str, i32)> {
        vec![(".srt", 10)]
    }

    fn parse_string(&self, content: &str) -> Result<SubtitleData, SubtitleError> {
        let content = content.trim_start_matches('\u{feff}');
        let mut lines = Vec::new();

        for block in content.replace("\r\n", "\n").split("\n\n") {
            let block = block.trim();
            if block.is_empty() {
                continue;
            }

            lines.push(parse_block(block)?);
        }

        let mut data = SubtitleData::with_lines(lines);
        data.metadata.insert("format".to_string(), MetadataValue::from("srt"));
        data.detected_format = Some(".srt".to_string());
        Ok(data)
    }

    fn compose(&self, data: &SubtitleData) -> Result<String, SubtitleError> {
        let add_rtl = data
            .metadata
            .get("add_rtl_markers")
            .and_then(MetadataValue::as_bool)
            .unwrap_or(false);

        let mut output = String::new();
        let mut number = data.start_line_number.unwrap_or(1);

        for line in data.lines.iter().filter(|line| line.is_valid()) {
            let mut text = line.text.clone();
            if add_rtl && helpers::is_right_to_left(&text) {
                text = helpers::add_rtl_markers(&text);
            }

            output.push_str(&format!("{}\n", number));
            output.push_str(&format!("{} --> {}", line.format_start(), line.format_end()));
            if let Some(proprietary) = line.metadata.get("proprietary").and_then(MetadataValue::as_text) {
                if !proprietary.is_empty() {
                    output.push(' ');
                    output.push_str(proprietary);
                }
            }
            output.push('\n');
            output.push_str(&text);
            output.push_str("\n\n");

            number += 1;
        }

        Ok(output)
    }
}

fn parse_block(block: &str) -> Result<SubtitleLine, SubtitleError> {
    let mut block_lines = block.lines();

    let index_line = block_lines.next().unwrap_or_default().trim();
    let number: usize = index_line
        .parse()
        .map_err(|_| SubtitleError::parse(format!("Invalid SRT sequence number: {}", index_line)))?;

    let timing_line = block_lines
        .next()
        .ok_or_else(|| SubtitleError::parse(format!("Missing timing line in block {}", number)))?;

    let captures = TIMING_REGEX
        .captures(timing_line.trim())
        .ok_or_else(|| SubtitleError::parse(format!("Invalid timing line: {}", timing_line)))?;

    let start = Duration::from_millis(helpers::parse_timestamp(&captures[1])?);
    let end = Duration::from_millis(helpers::parse_timestamp(&captures[2])?);
    let proprietary = captures[3].trim();

    let text = block_lines.collect::<Vec<&str>>().join("\n");

    let mut line = SubtitleLine::new(number, start, end, text);
    if !proprietary.is_empty() {
        line.metadata.insert("proprietary".to_string(), MetadataValue::from(proprietary));
    }

    Ok(line)
}
