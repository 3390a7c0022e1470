/*!
 * Format registry and handler tests over real files.
 */

use llm_subtrans::formats::{FormatRegistry, SubtitleFileHandler, VoidFileHandler};
use llm_subtrans::subtitles::MetadataValue;

use crate::common;

#[test]
fn test_registry_selects_handler_from_file_path() {
    let temp = common::create_temp_dir().unwrap();
    let registry = FormatRegistry::with_builtin_handlers();

    let srt = common::create_test_file(temp.path(), "movie.srt", &common::generate_srt(1, 3, |n| format!("line {}", n))).unwrap();
    let handler = registry.create_handler_for_path(&srt).unwrap();
    assert_eq!(handler.name(), "srt");

    let ass = common::create_test_file(temp.path(), "movie.ass", common::SAMPLE_ASS).unwrap();
    let handler = registry.create_handler_for_path(&ass).unwrap();
    assert_eq!(handler.name(), "ssa");
}

#[test]
fn test_empty_registry_knows_nothing() {
    let registry = FormatRegistry::empty();
    assert!(registry.enumerate_formats().is_empty());
    assert!(registry.create_handler(".srt").is_err());
}

#[test]
fn test_parse_file_from_disk() {
    let temp = common::create_temp_dir().unwrap();
    let registry = FormatRegistry::with_builtin_handlers();

    let content = common::generate_srt(1, 5, |n| format!("第{}行", n));
    let path = common::create_test_file(temp.path(), "movie.srt", &content).unwrap();

    let handler = registry.create_handler(".srt").unwrap();
    let data = handler.parse_file(&path).unwrap();

    assert_eq!(data.lines.len(), 5);
    assert_eq!(data.lines[0].text, "第1行");
    assert_eq!(data.lines[4].number, 5);
}

#[test]
fn test_void_handler_refuses_files() {
    let temp = common::create_temp_dir().unwrap();
    let path = common::create_test_file(temp.path(), "movie.srt", "1\n00:00:01,000 --> 00:00:02,000\nHi\n").unwrap();

    let handler = VoidFileHandler;
    assert!(handler.parse_file(&path).is_err());
}

#[test]
fn test_ass_styles_survive_file_roundtrip() {
    let temp = common::create_temp_dir().unwrap();
    let registry = FormatRegistry::with_builtin_handlers();
    let path = common::create_test_file(temp.path(), "movie.ass", common::SAMPLE_ASS).unwrap();

    let handler = registry.create_handler(".ass").unwrap();
    let data = handler.parse_file(&path).unwrap();

    let styles = data.metadata.get("styles").and_then(MetadataValue::as_map).unwrap();
    assert_eq!(styles.len(), 2);
    assert!(styles.contains_key("Default"));
    assert!(styles.contains_key("Sign"));

    // Compose, reparse and compare the styles byte for byte
    let composed = handler.compose(&data).unwrap();
    let reparsed = handler.parse_string(&composed).unwrap();
    assert_eq!(reparsed.metadata.get("styles"), data.metadata.get("styles"));

    let styles_section = |text: &str| -> String {
        text.lines()
            .skip_while(|line| !line.contains("Styles]"))
            .take_while(|line| !line.trim().is_empty())
            .collect::<Vec<&str>>()
            .join("\n")
    };
    let recomposed = handler.compose(&reparsed).unwrap();
    assert_eq!(styles_section(&composed), styles_section(&recomposed));
}

#[test]
fn test_ass_break_sentinels_restored_on_compose() {
    let registry = FormatRegistry::with_builtin_handlers();
    let handler = registry.create_handler(".ass").unwrap();

    let data = handler.parse_string(common::SAMPLE_ASS).unwrap();
    assert!(data.lines[1].text.contains("<wbr>"));
    assert!(data.lines[2].text.contains('\n'));

    let composed = handler.compose(&data).unwrap();
    assert!(composed.contains("A line with\\na soft break"));
    assert!(composed.contains("Hard\\Nbreak line"));
}

#[test]
fn test_vtt_handler_from_registry() {
    let registry = FormatRegistry::with_builtin_handlers();
    let handler = registry.create_handler(".vtt").unwrap();

    let data = handler
        .parse_string("WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nHello\n")
        .unwrap();
    assert_eq!(data.lines.len(), 1);

    let composed = handler.compose(&data).unwrap();
    assert!(composed.starts_with("WEBVTT"));
}
