/*!
 * Response parsing.
 *
 * A line-oriented recogniser over the model's reply: `#N`, `Original>`
 * and `Translation>` markers delimit stanzas, with the translation body
 * captured until the next `#` marker or a closing tag. The `<summary>`
 * and `<scene>` tags are extracted with a scan over the whole response.
 */

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

static LINE_MARKER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#(\d+)\s*$").unwrap());
static SUMMARY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<summary>(.*?)</summary>").unwrap());
static SCENE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<scene>(.*?)</scene>").unwrap());

/// The structured content recovered from a model response
#[derive(Debug, Clone, Default)]
pub struct ParsedResponse {
    /// Translations keyed by line number
    pub translations: BTreeMap<usize, String>,
    /// Line numbers that appeared more than once
    pub duplicates: Vec<usize>,
    /// Content of the `<summary>` tag
    pub summary: Option<String>,
    /// Content of the `<scene>` tag
    pub scene_summary: Option<String>,
}

#[derive(PartialEq)]
enum ScanState {
    /// Between stanzas
    Idle,
    /// Inside a stanza, before the translation marker
    InOriginal,
    /// Capturing translation body lines
    InTranslation,
}

/// Parse a model response into aligned translations and tags
pub fn parse_response(text: &str) -> ParsedResponse {
    let mut parsed = ParsedResponse::default();

    let mut state = ScanState::Idle;
    let mut current_number: Option<usize> = None;
    let mut body: Vec<String> = Vec::new();

    let mut close_stanza =
        |number: &mut Option<usize>, body: &mut Vec<String>, parsed: &mut ParsedResponse| {
            if let Some(number) = number.take() {
                let translation = body.join("\n").trim().to_string();
                if parsed.translations.contains_key(&number) {
                    parsed.duplicates.push(number);
                } else {
                    parsed.translations.insert(number, translation);
                }
            }
            body.clear();
        };

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some(captures) = LINE_MARKER_REGEX.captures(trimmed) {
            close_stanza(&mut current_number, &mut body, &mut parsed);
            current_number = captures[1].parse().ok();
            state = ScanState::InOriginal;
            continue;
        }

        // A closing tag ends any open stanza
        if trimmed.starts_with("<summary") || trimmed.starts_with("<scene") {
            close_stanza(&mut current_number, &mut body, &mut parsed);
            state = ScanState::Idle;
            continue;
        }

        match state {
            ScanState::InOriginal => {
                if let Some(rest) = trimmed.strip_prefix("Translation>") {
                    state = ScanState::InTranslation;
                    let inline = rest.trim();
                    if !inline.is_empty() {
                        body.push(inline.to_string());
                    }
                }
                // Original text lines are not captured; the originals are
                // matched by number, not by echo
            }
            ScanState::InTranslation => {
                body.push(line.to_string());
            }
            ScanState::Idle => {}
        }
    }

    close_stanza(&mut current_number, &mut body, &mut parsed);

    parsed.summary = extract_tag(&SUMMARY_REGEX, text);
    parsed.scene_summary = extract_tag(&SCENE_REGEX, text);
    parsed
}

fn extract_tag(regex: &Regex, text: &str) -> Option<String> {
    regex
        .captures(text)
        .map(|captures| captures[1].trim().to_string())
        .filter(|content| !content.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = "\
#1
Original>
Hello there
Translation>
Bonjour

#2
Original>
Two
lines
Translation>
Deux
lignes

<summary>A greeting.</summary>
<scene>Two people meet.</scene>";

    #[test]
    fn test_parse_aligned_response() {
        let parsed = parse_response(RESPONSE);

        assert_eq!(parsed.translations.len(), 2);
        assert_eq!(parsed.translations.get(&1).map(String::as_str), Some("Bonjour"));
        assert_eq!(parsed.translations.get(&2).map(String::as_str), Some("Deux\nlignes"));
        assert!(parsed.duplicates.is_empty());
    }

    #[test]
    fn test_summary_and_scene_extraction() {
        let parsed = parse_response(RESPONSE);

        assert_eq!(parsed.summary.as_deref(), Some("A greeting."));
        assert_eq!(parsed.scene_summary.as_deref(), Some("Two people meet."));
    }

    #[test]
    fn test_duplicate_numbers_are_recorded() {
        let response = "#3\nOriginal>\na\nTranslation>\nx\n\n#3\nOriginal>\na\nTranslation>\ny\n";
        let parsed = parse_response(response);

        assert_eq!(parsed.translations.get(&3).map(String::as_str), Some("x"));
        assert_eq!(parsed.duplicates, vec![3]);
    }

    #[test]
    fn test_missing_translation_body_is_empty() {
        let response = "#7\nOriginal>\nsomething\nTranslation>\n\n<summary>s</summary>";
        let parsed = parse_response(response);

        assert_eq!(parsed.translations.get(&7).map(String::as_str), Some(""));
    }

    #[test]
    fn test_inline_translation_on_marker_line() {
        let response = "#9\nOriginal>\nhi\nTranslation> salut\n";
        let parsed = parse_response(response);

        assert_eq!(parsed.translations.get(&9).map(String::as_str), Some("salut"));
    }

    #[test]
    fn test_original_text_is_not_mistaken_for_translation() {
        let response = "#1\nOriginal>\nTranslation looks like this\nTranslation>\nreal translation\n";
        let parsed = parse_response(response);

        assert_eq!(parsed.translations.get(&1).map(String::as_str), Some("real translation"));
    }

    #[test]
    fn test_multiline_summary() {
        let response = "#1\nOriginal>\na\nTranslation>\nb\n<summary>Line one\nline two</summary>";
        let parsed = parse_response(response);

        assert_eq!(parsed.summary.as_deref(), Some("Line one\nline two"));
    }

    #[test]
    fn test_soft_break_sentinel_survives() {
        let response = "#1\nOriginal>\nword<wbr>break\nTranslation>\nmot<wbr>coupure\n";
        let parsed = parse_response(response);

        assert_eq!(parsed.translations.get(&1).map(String::as_str), Some("mot<wbr>coupure"));
    }
}
