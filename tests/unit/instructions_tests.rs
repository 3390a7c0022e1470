/*!
 * Instruction file loading tests.
 */

use llm_subtrans::translation::instructions::{
    load_instructions_file, DEFAULT_PROMPT, DEFAULT_RETRY_INSTRUCTIONS,
};

use crate::common;

#[test]
fn test_load_sectioned_instruction_file() {
    let temp = common::create_temp_dir().unwrap();
    let content = "### prompt\nTranslate the dialogue[ to language]\n\n### instructions\nKeep each line separate.\n\n### retry_instructions\nRedo it, line by line.\n";
    let path = common::create_test_file(temp.path(), "instructions.txt", content).unwrap();

    let instructions = load_instructions_file(&path).unwrap();
    assert_eq!(instructions.prompt, "Translate the dialogue[ to language]");
    assert_eq!(instructions.instructions, "Keep each line separate.");
    assert_eq!(instructions.retry_instructions, "Redo it, line by line.");
    assert_eq!(instructions.instruction_file.as_deref(), Some("instructions.txt"));
}

#[test]
fn test_load_legacy_instruction_file_with_divider() {
    let temp = common::create_temp_dir().unwrap();
    let content = "Translate naturally.\nPreserve names.\n####\nThe previous attempt failed, translate each line separately.\n";
    let path = common::create_test_file(temp.path(), "legacy.txt", content).unwrap();

    let instructions = load_instructions_file(&path).unwrap();
    assert_eq!(instructions.instructions, "Translate naturally.\nPreserve names.");
    assert!(instructions.retry_instructions.starts_with("The previous attempt failed"));
    // Legacy files have no prompt section; the default applies
    assert_eq!(instructions.prompt, DEFAULT_PROMPT);
}

#[test]
fn test_load_legacy_instruction_file_without_divider() {
    let temp = common::create_temp_dir().unwrap();
    let content = "Only main instructions here.\n";
    let path = common::create_test_file(temp.path(), "plain.txt", content).unwrap();

    let instructions = load_instructions_file(&path).unwrap();
    assert_eq!(instructions.instructions, "Only main instructions here.");
    assert_eq!(instructions.retry_instructions, DEFAULT_RETRY_INSTRUCTIONS);
}

#[test]
fn test_missing_file_is_an_error() {
    let temp = common::create_temp_dir().unwrap();
    let missing = temp.path().join("not-there.txt");
    assert!(load_instructions_file(&missing).is_err());
}
