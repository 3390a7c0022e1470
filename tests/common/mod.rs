/*!
 * Common test utilities for the llm-subtrans test suite
 */

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;

/// Initialise logging for a test; safe to call repeatedly
#[allow(dead_code)]
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Build SRT content with `lines_per_scene` lines per scene; scenes are
/// separated by a 60 second gap, lines within a scene by 2 seconds.
pub fn generate_srt(scenes: usize, lines_per_scene: usize, text: impl Fn(usize) -> String) -> String {
    let mut output = String::new();
    let mut number = 1;
    let mut cursor_ms: u64 = 1_000;

    for _ in 0..scenes {
        for _ in 0..lines_per_scene {
            let start = cursor_ms;
            let end = start + 1_500;
            output.push_str(&format!(
                "{}\n{} --> {}\n{}\n\n",
                number,
                format_srt_time(start),
                format_srt_time(end),
                text(number)
            ));
            number += 1;
            cursor_ms = end + 2_000;
        }
        cursor_ms += 60_000;
    }

    output
}

fn format_srt_time(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

/// A 64-line Chinese SRT in two scenes, for end-to-end scenarios
pub fn chinese_srt_two_scenes() -> String {
    generate_srt(2, 32, |number| format!("第{}行的台词内容。", number))
}

/// A small ASS file with two styles and a coloured Default style
pub const SAMPLE_ASS: &str = "\
[Script Info]
Title: Roundtrip Sample
ScriptType: v4.00+
PlayResX: 1280
PlayResY: 720

[V4+ Styles]
Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding
Style: Default,Arial,48,&H00FFE0C0,&H000000FF,&H00101010,&H80000000,-1,0,0,0,100,100,0,0,1,2,1,2,10,10,10,1
Style: Sign,Verdana,36,&H0000FFFF,&H000000FF,&H00000000,&H80000000,0,-1,0,0,100,100,0,0,1,2,1,8,10,10,10,1

[Events]
Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text
Dialogue: 0,0:00:01.00,0:00:03.00,Default,Anna,0,0,0,,First spoken line
Dialogue: 0,0:00:05.00,0:00:08.00,Default,,0,0,0,,A line with\\na soft break
Dialogue: 1,0:00:10.00,0:00:12.00,Sign,,0,0,0,,Hard\\Nbreak line
";
