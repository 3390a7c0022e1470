/*!
 * Project settings with a fixed schema.
 *
 * Settings arrive from project files, the CLI and callers as loose JSON
 * maps; this module types them against the allow-list, rewrites legacy
 * keys from older project files and canonicalises names and substitutions.
 */

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// The fixed set of recognised project settings keys
pub const PROJECT_SETTINGS_KEYS: &[&str] = &[
    "provider",
    "model",
    "target_language",
    "prompt",
    "task_type",
    "instructions",
    "retry_instructions",
    "movie_name",
    "description",
    "names",
    "substitutions",
    "substitution_mode",
    "include_original",
    "add_right_to_left_markers",
    "instruction_file",
    "format",
];

/// How substitutions are matched against source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubstitutionMode {
    /// Whole words for alphabetic scripts, partial matches otherwise
    #[default]
    #[serde(rename = "Auto")]
    Auto,
    /// Only replace complete words
    #[serde(rename = "Whole Words")]
    WholeWords,
    /// Replace any occurrence, even inside words
    #[serde(rename = "Partial Words")]
    PartialWords,
}

impl FromStr for SubstitutionMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Auto" | "auto" | "" => Ok(SubstitutionMode::Auto),
            "Whole Words" => Ok(SubstitutionMode::WholeWords),
            "Partial Words" => Ok(SubstitutionMode::PartialWords),
            other => Err(format!("Unknown substitution mode: {}", other)),
        }
    }
}

/// A single text substitution, serialised as `"before::after"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub before: String,
    pub after: String,
}

impl Substitution {
    pub fn new(before: impl Into<String>, after: impl Into<String>) -> Self {
        Substitution { before: before.into(), after: after.into() }
    }
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}::{}", self.before, self.after)
    }
}

impl FromStr for Substitution {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split_once("::") {
            Some((before, after)) if !before.trim().is_empty() => {
                Ok(Substitution::new(before.trim(), after.trim()))
            }
            _ => Err(format!("Invalid substitution (expected before::after): {}", value)),
        }
    }
}

impl Serialize for Substitution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Substitution {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// Typed project settings (the allow-list in schema form)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_instructions: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movie_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub substitutions: Vec<Substitution>,

    #[serde(default)]
    pub substitution_mode: SubstitutionMode,

    #[serde(default)]
    pub include_original: bool,

    #[serde(default, rename = "add_right_to_left_markers")]
    pub add_rtl_markers: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl ProjectSettings {
    /// Apply a loose settings map: legacy keys are rewritten, unrecognised
    /// keys dropped with a debug log, names and substitutions parsed into
    /// canonical form. Returns true when at least one recognised value
    /// actually changed.
    pub fn update(&mut self, settings: BTreeMap<String, Value>) -> bool {
        let mut settings = settings;
        upgrade_legacy_keys(&mut settings, &self.names);

        let before = self.clone();

        for (key, value) in settings {
            if !PROJECT_SETTINGS_KEYS.contains(&key.as_str()) {
                debug!("Ignoring unrecognised project setting: {}", key);
                continue;
            }

            match key.as_str() {
                "provider" => self.provider = string_value(&value),
                "model" => self.model = string_value(&value),
                "target_language" => self.target_language = string_value(&value),
                "prompt" => self.prompt = string_value(&value),
                "task_type" => self.task_type = string_value(&value),
                "instructions" => self.instructions = string_value(&value),
                "retry_instructions" => self.retry_instructions = string_value(&value),
                "movie_name" => self.movie_name = string_value(&value),
                "description" => self.description = string_value(&value),
                "instruction_file" => self.instruction_file = string_value(&value),
                "format" => self.format = string_value(&value),
                "names" => self.names = parse_names(&value),
                "substitutions" => self.substitutions = parse_substitutions(&value),
                "substitution_mode" => {
                    if let Some(text) = value.as_str() {
                        if let Ok(mode) = text.parse() {
                            self.substitution_mode = mode;
                        }
                    }
                }
                "include_original" => self.include_original = value.as_bool().unwrap_or(false),
                "add_right_to_left_markers" => self.add_rtl_markers = value.as_bool().unwrap_or(false),
                _ => unreachable!("key checked against the allow-list"),
            }
        }

        *self != before
    }
}

/// Deserialise settings from a loose JSON map, applying the allow-list
/// filter and legacy-key upgrades. Used for the settings field of project
/// files so documents written by older versions load cleanly.
pub fn deserialize_settings<'de, D>(deserializer: D) -> Result<ProjectSettings, D::Error>
where
    D: Deserializer<'de>,
{
    let map: BTreeMap<String, Value> = BTreeMap::deserialize(deserializer)?;
    let mut settings = ProjectSettings::default();
    settings.update(map);
    Ok(settings)
}

fn string_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Null => None,
        Value::String(_) => None,
        other => Some(other.to_string()),
    }
}

/// Parse a names value: either a list of strings or a single string
/// separated by commas or newlines. Order preserved, duplicates dropped.
pub fn parse_names(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Value::String(text) => text
            .split(|c| c == ',' || c == '\n')
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    dedupe_names(raw)
}

fn dedupe_names(raw: Vec<String>) -> Vec<String> {
    let mut names = Vec::new();
    for name in raw {
        let name = name.trim();
        if !name.is_empty() && !names.iter().any(|existing: &String| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Parse substitutions from a list of `before::after` strings, a map, or a
/// newline-separated string
pub fn parse_substitutions(value: &Value) -> Vec<Substitution> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str())
            .filter_map(|text| text.parse().ok())
            .collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(before, after)| {
                after.as_str().map(|after| Substitution::new(before.clone(), after))
            })
            .collect(),
        Value::String(text) => text
            .lines()
            .filter_map(|line| line.parse().ok())
            .collect(),
        _ => Vec::new(),
    }
}

/// Rewrite settings keys from older project files:
/// `synopsis` → `description`, `characters` merged into `names`,
/// `gpt_prompt` → `prompt`, `gpt_model` → `model`, and boolean
/// `match_partial_words` → `substitution_mode = "Partial Words"`.
fn upgrade_legacy_keys(settings: &mut BTreeMap<String, Value>, current_names: &[String]) {
    if let Some(synopsis) = settings.remove("synopsis") {
        if !settings.get("description").is_some_and(|v| !v.is_null()) {
            settings.insert("description".to_string(), synopsis);
        }
    }

    if let Some(characters) = settings.remove("characters") {
        let mut names: Vec<String> = current_names.to_vec();
        if let Some(incoming) = settings.get("names") {
            names.extend(parse_names(incoming));
        }
        names.extend(parse_names(&characters));
        let merged: Vec<Value> = dedupe_names(names).into_iter().map(Value::String).collect();
        settings.insert("names".to_string(), Value::Array(merged));
    }

    if let Some(prompt) = settings.remove("gpt_prompt") {
        settings.insert("prompt".to_string(), prompt);
    }

    if let Some(model) = settings.remove("gpt_model") {
        settings.insert("model".to_string(), model);
    }

    if let Some(partial) = settings.remove("match_partial_words").and_then(|v| v.as_bool()) {
        if !settings.get("substitution_mode").is_some_and(|v| !v.is_null()) {
            let mode = if partial { "Partial Words" } else { "Auto" };
            settings.insert("substitution_mode".to_string(), Value::String(mode.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_update_reports_changes() {
        let mut settings = ProjectSettings::default();

        let changed = settings.update(map(json!({"target_language": "French"})));
        assert!(changed);
        assert_eq!(settings.target_language.as_deref(), Some("French"));

        // Same value again is not a change
        let changed = settings.update(map(json!({"target_language": "French"})));
        assert!(!changed);
    }

    #[test]
    fn test_unknown_keys_are_dropped() {
        let mut settings = ProjectSettings::default();
        let changed = settings.update(map(json!({"frobnicate": true})));
        assert!(!changed);
    }

    #[test]
    fn test_legacy_keys_are_upgraded() {
        let mut settings = ProjectSettings::default();
        settings.names = vec!["Alice".to_string()];

        settings.update(map(json!({
            "synopsis": "A quiet heist",
            "characters": ["Bob", "Alice"],
            "gpt_prompt": "Translate these subtitles",
            "gpt_model": "gpt-4o",
            "match_partial_words": true
        })));

        assert_eq!(settings.description.as_deref(), Some("A quiet heist"));
        assert_eq!(settings.names, vec!["Alice".to_string(), "Bob".to_string()]);
        assert_eq!(settings.prompt.as_deref(), Some("Translate these subtitles"));
        assert_eq!(settings.model.as_deref(), Some("gpt-4o"));
        assert_eq!(settings.substitution_mode, SubstitutionMode::PartialWords);
    }

    #[test]
    fn test_names_parse_from_string_and_list() {
        let from_string = parse_names(&json!("Alice, Bob\nCarol, Alice"));
        assert_eq!(from_string, vec!["Alice", "Bob", "Carol"]);

        let from_list = parse_names(&json!(["Dave", " Eve ", ""]));
        assert_eq!(from_list, vec!["Dave", "Eve"]);
    }

    #[test]
    fn test_substitutions_parse_and_roundtrip() {
        let parsed = parse_substitutions(&json!(["colour::color", "bad line", "grey::gray"]));
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], Substitution::new("colour", "color"));

        let json = serde_json::to_string(&parsed).unwrap();
        assert!(json.contains("colour::color"));
        let back: Vec<Substitution> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, parsed);
    }

    #[test]
    fn test_substitution_mode_serialises_with_spaces() {
        let json = serde_json::to_string(&SubstitutionMode::PartialWords).unwrap();
        assert_eq!(json, "\"Partial Words\"");
    }

    #[test]
    fn test_settings_roundtrip() {
        let mut settings = ProjectSettings::default();
        settings.update(map(json!({
            "provider": "OpenAI",
            "model": "gpt-4o",
            "target_language": "German",
            "names": ["Alice"],
            "substitutions": ["a::b"],
            "include_original": true,
            "add_right_to_left_markers": true
        })));

        let json = serde_json::to_string(&settings).unwrap();
        let back: ProjectSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }
}
