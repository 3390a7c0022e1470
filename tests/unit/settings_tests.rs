/*!
 * Settings boundary tests, including the legacy project upgrade path.
 */

use llm_subtrans::project::serialiser::decode_project;
use llm_subtrans::settings::SubstitutionMode;

/// A project document written by an older version, with legacy keys
const LEGACY_PROJECT: &str = r#"{
  "settings": {
    "synopsis": "An old project about a heist",
    "characters": ["Vincent", "Jules"],
    "names": ["Mia"],
    "gpt_prompt": "Translate these subtitles for me",
    "gpt_model": "gpt-4",
    "match_partial_words": true,
    "target_language": "Spanish"
  },
  "scenes": [
    {
      "number": 1,
      "batches": [
        {
          "number": 1,
          "scene": 1,
          "originals": [
            {
              "number": 1,
              "start": "00:00:01,000",
              "end": "00:00:03,000",
              "text": "Say what again."
            }
          ]
        }
      ]
    }
  ]
}"#;

#[test]
fn test_legacy_settings_upgraded_on_load() {
    let subtitles = decode_project(LEGACY_PROJECT).unwrap();
    let settings = &subtitles.settings;

    assert_eq!(settings.description.as_deref(), Some("An old project about a heist"));
    assert_eq!(settings.prompt.as_deref(), Some("Translate these subtitles for me"));
    assert_eq!(settings.model.as_deref(), Some("gpt-4"));
    assert_eq!(settings.substitution_mode, SubstitutionMode::PartialWords);
    assert_eq!(settings.target_language.as_deref(), Some("Spanish"));

    // names is the superset of the old characters list and the names list
    assert!(settings.names.contains(&"Mia".to_string()));
    assert!(settings.names.contains(&"Vincent".to_string()));
    assert!(settings.names.contains(&"Jules".to_string()));
}

#[test]
fn test_legacy_keys_absent_after_save() {
    let subtitles = decode_project(LEGACY_PROJECT).unwrap();
    let saved = llm_subtrans::project::serialiser::encode_project(&subtitles).unwrap();

    for legacy_key in ["synopsis", "characters", "gpt_prompt", "gpt_model", "match_partial_words"] {
        assert!(
            !saved.contains(&format!("\"{}\"", legacy_key)),
            "legacy key {} leaked into the saved project",
            legacy_key
        );
    }

    assert!(saved.contains("\"description\""));
    assert!(saved.contains("\"prompt\""));
    assert!(saved.contains("\"model\""));
    assert!(saved.contains("Partial Words"));
}

#[test]
fn test_upgraded_project_roundtrips_cleanly() {
    let subtitles = decode_project(LEGACY_PROJECT).unwrap();
    let saved = llm_subtrans::project::serialiser::encode_project(&subtitles).unwrap();
    let reloaded = decode_project(&saved).unwrap();

    assert_eq!(reloaded.settings, subtitles.settings);
    assert_eq!(reloaded.linecount(), 1);
}
