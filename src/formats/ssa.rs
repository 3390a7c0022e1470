/*!
 * SubStation Alpha (.ssa) and Advanced SubStation Alpha (.ass) handler.
 *
 * A native section parser: `[Script Info]`, `[V4+ Styles]` / `[V4 Styles]`,
 * `[Events]` and `[Aegisub Project Garbage]`. Styles keep typed fields with
 * colours as `{r,g,b,a}` values; the original `Format:` field order is
 * retained in metadata so composition reproduces the source layout.
 *
 * Text normalisation: `\N` (hard break) becomes `\n`, `\n` (soft break)
 * becomes the `<wbr>` sentinel, and the basic inline tags
 * `{\i1}{\b1}{\u1}{\s1}` convert to HTML pairs. Complex override tags at
 * the start of a line are captured to line metadata and restored verbatim.
 */

use std::collections::BTreeMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::SubtitleError;
use crate::subtitles::{Colour, Metadata, MetadataValue, SubtitleLine};

use super::{SubtitleData, SubtitleFileHandler};

static SECTION_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[([^\]]+)\]\s*$").unwrap());
static START_TAGS_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\{[^}]*\})+").unwrap());
static TAG_BLOCK_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^}]+\}").unwrap());
static STANDALONE_BASIC_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\\(?:[ibs][01]|u[01]?)\}$").unwrap());
static BASIC_TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\(?:[ibs][01]|u[01]?)").unwrap());

/// Basic SSA formatting tags and their HTML equivalents
const SSA_HTML_TAGS: &[(&str, &str)] = &[
    (r"{\i1}", "<i>"),
    (r"{\i0}", "</i>"),
    (r"{\b1}", "<b>"),
    (r"{\b0}", "</b>"),
    (r"{\u1}", "<u>"),
    (r"{\u0}", "</u>"),
    (r"{\s1}", "<s>"),
    (r"{\s0}", "</s>"),
];

/// Canonical ASS style field order, used when the source order is unknown
const DEFAULT_STYLE_FORMAT: &[&str] = &[
    "Name", "Fontname", "Fontsize", "PrimaryColour", "SecondaryColour", "OutlineColour",
    "BackColour", "Bold", "Italic", "Underline", "StrikeOut", "ScaleX", "ScaleY", "Spacing",
    "Angle", "BorderStyle", "Outline", "Shadow", "Alignment", "MarginL", "MarginR", "MarginV",
    "Encoding",
];

/// Canonical ASS event field order
const DEFAULT_EVENT_FORMAT: &[&str] = &[
    "Layer", "Start", "End", "Style", "Name", "MarginL", "MarginR", "MarginV", "Effect", "Text",
];

/// File handler for SSA and ASS subtitle formats
#[derive(Debug, Default)]
pub struct SsaFileHandler;

impl SubtitleFileHandler for SsaFileHandler {
    fn name(&self) -> &'static str {
        "ssa"
    }

    fn extension_priorities(&self) -> Vec<(&'static str, i32)> {
        vec![(".ass", 10), (".ssa", 10)]
    }

    fn parse_string(&self, content: &str) -> Result<SubtitleData, SubtitleError> {
        Parser::default().parse(content)
    }

    fn compose(&self, data: &SubtitleData) -> Result<String, SubtitleError> {
        compose_document(data)
    }
}

#[derive(Default)]
struct Parser {
    info: BTreeMap<String, MetadataValue>,
    aegisub: BTreeMap<String, MetadataValue>,
    styles: BTreeMap<String, MetadataValue>,
    style_format: Vec<String>,
    event_format: Vec<String>,
    lines: Vec<SubtitleLine>,
    v4plus: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    ScriptInfo,
    Styles,
    Events,
    AegisubProject,
    Unknown,
}

impl Parser {
    fn parse(mut self, content: &str) -> Result<SubtitleData, SubtitleError> {
        let content = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
        let mut section = Section::None;

        for (line_index, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            if let Some(captures) = SECTION_REGEX.captures(line) {
                section = match captures[1].to_lowercase().as_str() {
                    "script info" => Section::ScriptInfo,
                    "v4+ styles" => {
                        self.v4plus = true;
                        Section::Styles
                    }
                    "v4 styles" => Section::Styles,
                    "events" => Section::Events,
                    "aegisub project garbage" => Section::AegisubProject,
                    _ => Section::Unknown,
                };
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim_start();

            match section {
                Section::ScriptInfo => {
                    self.info.insert(key.to_string(), MetadataValue::from(value));
                }
                Section::AegisubProject => {
                    self.aegisub.insert(key.to_string(), MetadataValue::from(value));
                }
                Section::Styles => self.parse_style_line(key, value, line_index)?,
                Section::Events => self.parse_event_line(key, value, line_index)?,
                Section::None | Section::Unknown => {}
            }
        }

        if self.lines.is_empty() && self.styles.is_empty() && self.info.is_empty() {
            return Err(SubtitleError::parse("No recognisable SSA/ASS sections found"));
        }

        let mut metadata = Metadata::new();
        let format = if self.v4plus { "ass" } else { "ssa" };
        metadata.insert("ssa_format".to_string(), MetadataValue::from(format));
        metadata.insert("info".to_string(), MetadataValue::Map(self.info));
        if !self.aegisub.is_empty() {
            metadata.insert("aegisub_project".to_string(), MetadataValue::Map(self.aegisub));
        }
        metadata.insert("styles".to_string(), MetadataValue::Map(self.styles));
        if !self.style_format.is_empty() {
            metadata.insert("style_format".to_string(), MetadataValue::List(self.style_format));
        }
        if !self.event_format.is_empty() {
            metadata.insert("event_format".to_string(), MetadataValue::List(self.event_format));
        }

        Ok(SubtitleData {
            lines: self.lines,
            metadata,
            start_line_number: None,
            detected_format: Some(format!(".{}", format)),
        })
    }

    fn parse_style_line(&mut self, key: &str, value: &str, line_index: usize) -> Result<(), SubtitleError> {
        match key {
            "Format" => {
                self.style_format = value.split(',').map(|field| field.trim().to_string()).collect();
                Ok(())
            }
            "Style" => {
                let fields = if self.style_format.is_empty() {
                    DEFAULT_STYLE_FORMAT.iter().map(|s| s.to_string()).collect()
                } else {
                    self.style_format.clone()
                };

                let values: Vec<&str> = value.splitn(fields.len(), ',').map(str::trim).collect();
                if values.len() < fields.len() {
                    return Err(SubtitleError::parse_at(
                        format!("Style line has {} fields, expected {}", values.len(), fields.len()),
                        line_index + 1,
                    ));
                }

                let mut style = BTreeMap::new();
                let mut name = String::new();
                for (field, value) in fields.iter().zip(values.iter()) {
                    if field == "Name" {
                        name = value.to_string();
                    }
                    style.insert(field.clone(), parse_style_value(field, value));
                }

                self.styles.insert(name, MetadataValue::Map(style));
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn parse_event_line(&mut self, key: &str, value: &str, line_index: usize) -> Result<(), SubtitleError> {
        match key {
            "Format" => {
                self.event_format = value.split(',').map(|field| field.trim().to_string()).collect();
                Ok(())
            }
            "Dialogue" | "Comment" => {
                let fields = if self.event_format.is_empty() {
                    DEFAULT_EVENT_FORMAT.iter().map(|s| s.to_string()).collect()
                } else {
                    self.event_format.clone()
                };

                let values: Vec<&str> = value.splitn(fields.len(), ',').collect();
                if values.len() < fields.len() {
                    return Err(SubtitleError::parse_at(
                        format!("Event line has {} fields, expected {}", values.len(), fields.len()),
                        line_index + 1,
                    ));
                }

                let mut start = Duration::ZERO;
                let mut end = Duration::ZERO;
                let mut text = "";
                let mut metadata = Metadata::new();
                metadata.insert("type".to_string(), MetadataValue::from(key));

                for (field, value) in fields.iter().zip(values.iter()) {
                    let value = value.trim();
                    match field.as_str() {
                        "Start" => start = parse_ssa_timestamp(value, line_index)?,
                        "End" => end = parse_ssa_timestamp(value, line_index)?,
                        "Text" => text = value,
                        "Layer" => {
                            metadata.insert("layer".to_string(), MetadataValue::Int(value.parse().unwrap_or(0)));
                        }
                        "Marked" => {
                            metadata.insert("marked".to_string(), MetadataValue::from(value));
                        }
                        "Style" => {
                            metadata.insert("style".to_string(), MetadataValue::from(value));
                        }
                        "Name" => {
                            if !value.is_empty() {
                                metadata.insert("name".to_string(), MetadataValue::from(value));
                            }
                        }
                        "MarginL" | "MarginR" | "MarginV" => {
                            let key = match field.as_str() {
                                "MarginL" => "margin_l",
                                "MarginR" => "margin_r",
                                _ => "margin_v",
                            };
                            metadata.insert(key.to_string(), MetadataValue::Int(value.parse().unwrap_or(0)));
                        }
                        "Effect" => {
                            if !value.is_empty() {
                                metadata.insert("effect".to_string(), MetadataValue::from(value));
                            }
                        }
                        _ => {}
                    }
                }

                // The Text field keeps everything after the last fixed comma
                let (normalised, override_tags) = ssa_text_to_internal(text);
                if let Some(tags) = override_tags {
                    metadata.insert("override_tags_start".to_string(), MetadataValue::Text(tags));
                }

                let number = self.lines.len() + 1;
                self.lines.push(SubtitleLine::with_metadata(number, start, end, normalised, metadata));
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Parse `H:MM:SS.cc` (centisecond) timestamps
fn parse_ssa_timestamp(value: &str, line_index: usize) -> Result<Duration, SubtitleError> {
    let parts: Vec<&str> = value.split(|c| c == ':' || c == '.').collect();
    if parts.len() != 4 {
        return Err(SubtitleError::parse_at(format!("Invalid SSA timestamp: {}", value), line_index + 1));
    }

    let parse = |text: &str| -> Result<u64, SubtitleError> {
        text.trim().parse().map_err(|_| {
            SubtitleError::parse_at(format!("Invalid SSA timestamp: {}", value), line_index + 1)
        })
    };

    let hours = parse(parts[0])?;
    let minutes = parse(parts[1])?;
    let seconds = parse(parts[2])?;
    let centis = parse(parts[3])?;

    Ok(Duration::from_millis(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + centis * 10))
}

fn format_ssa_timestamp(duration: Duration) -> String {
    let total_cs = duration.as_millis() as u64 / 10;
    let hours = total_cs / 360_000;
    let minutes = (total_cs % 360_000) / 6_000;
    let seconds = (total_cs % 6_000) / 100;
    let centis = total_cs % 100;

    format!("{}:{:02}:{:02}.{:02}", hours, minutes, seconds, centis)
}

/// Type a style field value: colours, booleans, numbers or text
fn parse_style_value(field: &str, value: &str) -> MetadataValue {
    match field {
        "PrimaryColour" | "SecondaryColour" | "OutlineColour" | "TertiaryColour" | "BackColour" => {
            parse_ssa_colour(value).map(MetadataValue::Colour).unwrap_or_else(|| MetadataValue::from(value))
        }
        "Bold" | "Italic" | "Underline" | "StrikeOut" => match value {
            "-1" => MetadataValue::Bool(true),
            "0" => MetadataValue::Bool(false),
            other => MetadataValue::Int(other.parse().unwrap_or(0)),
        },
        "Fontsize" | "ScaleX" | "ScaleY" | "Spacing" | "Angle" | "Outline" | "Shadow" => {
            value.parse::<f64>().map(MetadataValue::Float).unwrap_or_else(|_| MetadataValue::from(value))
        }
        "BorderStyle" | "Alignment" | "MarginL" | "MarginR" | "MarginV" | "Encoding" | "AlphaLevel" => {
            value.parse::<i64>().map(MetadataValue::Int).unwrap_or_else(|_| MetadataValue::from(value))
        }
        _ => MetadataValue::from(value),
    }
}

/// Parse an SSA colour literal: `&HAABBGGRR`, `&HBBGGRR&` or a plain integer
fn parse_ssa_colour(value: &str) -> Option<Colour> {
    let trimmed = value.trim().trim_end_matches('&');
    let number = if let Some(hex) = trimmed.strip_prefix("&H").or_else(|| trimmed.strip_prefix("&h")) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        trimmed.parse::<u32>().ok()?
    };

    let a = ((number >> 24) & 0xFF) as u8;
    let b = ((number >> 16) & 0xFF) as u8;
    let g = ((number >> 8) & 0xFF) as u8;
    let r = (number & 0xFF) as u8;

    Some(Colour::new(r, g, b, a))
}

fn format_ssa_colour(colour: &Colour) -> String {
    format!(
        "&H{:02X}{:02X}{:02X}{:02X}",
        colour.a, colour.b, colour.g, colour.r
    )
}

/// Convert raw SSA event text to the internal representation.
/// Returns the normalised text and any complex override tags captured from
/// the start of the line.
fn ssa_text_to_internal(text: &str) -> (String, Option<String>) {
    let mut text = text.to_string();
    let mut override_tags = None;

    if let Some(tags_match) = START_TAGS_REGEX.find(&text) {
        let tags_section = tags_match.as_str().to_string();
        let remaining = text[tags_match.end()..].to_string();

        let mut basic_tags = String::new();
        let mut complex_tags = String::new();

        for block in TAG_BLOCK_REGEX.find_iter(&tags_section) {
            let block = block.as_str();
            if STANDALONE_BASIC_TAG_REGEX.is_match(block) {
                basic_tags.push_str(block);
                continue;
            }

            for basic in BASIC_TAG_REGEX.find_iter(block) {
                basic_tags.push('{');
                basic_tags.push_str(basic.as_str());
                basic_tags.push('}');
            }
            let cleaned = BASIC_TAG_REGEX.replace_all(block, "").to_string();
            if cleaned != "{}" {
                complex_tags.push_str(&cleaned);
            }
        }

        if !complex_tags.is_empty() {
            override_tags = Some(complex_tags);
        }
        text = format!("{}{}", basic_tags, remaining);
    }

    text = text.replace("\\N", "\n").replace("\\n", crate::helpers::SOFT_BREAK);

    for (ssa, html) in SSA_HTML_TAGS {
        text = text.replace(ssa, html);
    }

    (text, override_tags)
}

/// Convert internal text back to SSA event text
fn internal_text_to_ssa(text: &str, metadata: &Metadata) -> String {
    let mut text = text.to_string();

    for (ssa, html) in SSA_HTML_TAGS {
        text = text.replace(html, ssa);
    }

    text = text.replace(crate::helpers::SOFT_BREAK, "\\n").replace('\n', "\\N");

    if let Some(tags) = metadata.get("override_tags_start").and_then(MetadataValue::as_text) {
        text = format!("{}{}", tags, text);
    }

    text
}

fn compose_document(data: &SubtitleData) -> Result<String, SubtitleError> {
    let v4plus = data
        .metadata
        .get("ssa_format")
        .and_then(MetadataValue::as_text)
        .map(|format| format != "ssa")
        .unwrap_or(true);

    let mut output = String::new();

    output.push_str("[Script Info]\n");
    if let Some(MetadataValue::Map(info)) = data.metadata.get("info") {
        for (key, value) in info {
            output.push_str(&format!("{}: {}\n", key, metadata_value_to_string(value)));
        }
    }
    output.push('\n');

    if let Some(MetadataValue::Map(aegisub)) = data.metadata.get("aegisub_project") {
        output.push_str("[Aegisub Project Garbage]\n");
        for (key, value) in aegisub {
            output.push_str(&format!("{}: {}\n", key, metadata_value_to_string(value)));
        }
        output.push('\n');
    }

    let style_fields: Vec<String> = match data.metadata.get("style_format") {
        Some(MetadataValue::List(fields)) => fields.clone(),
        _ => DEFAULT_STYLE_FORMAT.iter().map(|s| s.to_string()).collect(),
    };

    output.push_str(if v4plus { "[V4+ Styles]\n" } else { "[V4 Styles]\n" });
    output.push_str(&format!("Format: {}\n", style_fields.join(", ")));
    if let Some(MetadataValue::Map(styles)) = data.metadata.get("styles") {
        for style in styles.values() {
            let Some(fields) = style.as_map() else { continue };
            let values: Vec<String> = style_fields
                .iter()
                .map(|field| fields.get(field).map(metadata_value_to_string).unwrap_or_default())
                .collect();
            output.push_str(&format!("Style: {}\n", values.join(",")));
        }
    }
    output.push('\n');

    let event_fields: Vec<String> = match data.metadata.get("event_format") {
        Some(MetadataValue::List(fields)) => fields.clone(),
        _ => DEFAULT_EVENT_FORMAT.iter().map(|s| s.to_string()).collect(),
    };

    output.push_str("[Events]\n");
    output.push_str(&format!("Format: {}\n", event_fields.join(", ")));

    for line in data.lines.iter().filter(|line| line.is_valid()) {
        let event_type = line
            .metadata
            .get("type")
            .and_then(MetadataValue::as_text)
            .unwrap_or("Dialogue");

        let values: Vec<String> = event_fields
            .iter()
            .map(|field| match field.as_str() {
                "Start" => format_ssa_timestamp(line.start),
                "End" => format_ssa_timestamp(line.end),
                "Text" => internal_text_to_ssa(&line.text, &line.metadata),
                "Layer" => line
                    .metadata
                    .get("layer")
                    .and_then(MetadataValue::as_int)
                    .unwrap_or(0)
                    .to_string(),
                "Marked" => line
                    .metadata
                    .get("marked")
                    .and_then(MetadataValue::as_text)
                    .unwrap_or("Marked=0")
                    .to_string(),
                "Style" => line
                    .metadata
                    .get("style")
                    .and_then(MetadataValue::as_text)
                    .unwrap_or("Default")
                    .to_string(),
                "Name" => line
                    .metadata
                    .get("name")
                    .and_then(MetadataValue::as_text)
                    .unwrap_or("")
                    .to_string(),
                "MarginL" | "MarginR" | "MarginV" => {
                    let key = match field.as_str() {
                        "MarginL" => "margin_l",
                        "MarginR" => "margin_r",
                        _ => "margin_v",
                    };
                    line.metadata.get(key).and_then(MetadataValue::as_int).unwrap_or(0).to_string()
                }
                "Effect" => line
                    .metadata
                    .get("effect")
                    .and_then(MetadataValue::as_text)
                    .unwrap_or("")
                    .to_string(),
                _ => String::new(),
            })
            .collect();

        output.push_str(&format!("{}: {}\n", event_type, values.join(",")));
    }

    Ok(output)
}

/// Render a metadata value in SSA field syntax
fn metadata_value_to_string(value: &MetadataValue) -> String {
    match value {
        MetadataValue::Text(text) => text.clone(),
        MetadataValue::Bool(true) => "-1".to_string(),
        MetadataValue::Bool(false) => "0".to_string(),
        MetadataValue::Int(number) => number.to_string(),
        MetadataValue::Float(number) => {
            if number.fract() == 0.0 {
                format!("{}", *number as i64)
            } else {
                format!("{}", number)
            }
        }
        MetadataValue::Colour(colour) => format_ssa_colour(colour),
        MetadataValue::List(items) => items.join(","),
        MetadataValue::Map(_) => String::new(),
    }
}
