use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::helpers;
use super::metadata::Metadata;

/// A single displayed cue.
///
/// Text uses the internal representation: hard line breaks are `\n` and
/// soft breaks the `<wbr>` sentinel; format handlers convert on the way
/// in and out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleLine {
    /// Stable 1-based line number, unique within the file on load
    pub number: usize,

    /// Start instant, millisecond precision
    #[serde(with = "timecode")]
    pub start: Duration,

    /// End instant, millisecond precision
    #[serde(with = "timecode")]
    pub end: Duration,

    /// Source cue text
    pub text: String,

    /// Translated cue text, same break semantics as `text`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,

    /// Format-specific per-line metadata (style, layer, speaker, cue id…)
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl SubtitleLine {
    /// Create a new subtitle line
    pub fn new(number: usize, start: Duration, end: Duration, text: impl Into<String>) -> Self {
        SubtitleLine {
            number,
            start,
            end,
            text: text.into(),
            translation: None,
            metadata: Metadata::new(),
        }
    }

    /// Create a new subtitle line carrying metadata
    pub fn with_metadata(
        number: usize,
        start: Duration,
        end: Duration,
        text: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        SubtitleLine { metadata, ..SubtitleLine::new(number, start, end, text) }
    }

    /// Duration of the cue
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    /// Gap between the end of `previous` and the start of this line
    pub fn gap_from(&self, previous: &SubtitleLine) -> Duration {
        self.start.saturating_sub(previous.end)
    }

    /// Whether the line has a non-empty translation
    pub fn has_translation(&self) -> bool {
        self.translation.as_ref().is_some_and(|t| !t.trim().is_empty())
    }

    /// Whether the line carries displayable text within a valid time range
    pub fn is_valid(&self) -> bool {
        !self.text.trim().is_empty() && self.start <= self.end
    }

    /// The canonical timestamp string for the start instant
    pub fn format_start(&self) -> String {
        helpers::format_timestamp(self.start.as_millis() as u64)
    }

    /// The canonical timestamp string for the end instant
    pub fn format_end(&self) -> String {
        helpers::format_timestamp(self.end.as_millis() as u64)
    }
}

impl fmt::Display for SubtitleLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.number)?;
        writeln!(f, "{} --> {}", self.format_start(), self.format_end())?;
        writeln!(f, "{}", self.text)
    }
}

/// Serde adapter storing durations as canonical timestamp strings
pub(crate) mod timecode {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    use crate::helpers;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&helpers::format_timestamp(value.as_millis() as u64))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        let ms = helpers::parse_timestamp(&text).map_err(serde::de::Error::custom)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(number: usize, start_ms: u64, end_ms: u64, text: &str) -> SubtitleLine {
        SubtitleLine::new(number, Duration::from_millis(start_ms), Duration::from_millis(end_ms), text)
    }

    #[test]
    fn test_duration_and_gap() {
        let first = line(1, 1000, 3000, "one");
        let second = line(2, 4500, 6000, "two");

        assert_eq!(first.duration(), Duration::from_millis(2000));
        assert_eq!(second.gap_from(&first), Duration::from_millis(1500));
    }

    #[test]
    fn test_has_translation_ignores_whitespace() {
        let mut l = line(1, 0, 1000, "text");
        assert!(!l.has_translation());

        l.translation = Some("   ".to_string());
        assert!(!l.has_translation());

        l.translation = Some("texte".to_string());
        assert!(l.has_translation());
    }

    #[test]
    fn test_line_serialises_timestamps_as_strings() {
        let l = line(3, 61_001, 63_500, "hello");
        let json = serde_json::to_value(&l).unwrap();
        assert_eq!(json["start"], "00:01:01,001");
        assert_eq!(json["end"], "00:01:03,500");

        let back: SubtitleLine = serde_json::from_value(json).unwrap();
        assert_eq!(back, l);
    }
}
