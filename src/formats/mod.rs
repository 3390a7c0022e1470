/*!
 * Subtitle format handlers and their registry.
 *
 * Each handler converts between a concrete on-disk format and the uniform
 * `SubtitleData` value used by the rest of the pipeline. The registry maps
 * lower-cased file extensions to handler constructors with a priority, so
 * alternative handlers can claim an extension.
 *
 * Handlers normalise text on the way in: format-specific hard line breaks
 * become `\n`, soft breaks become the `<wbr>` sentinel; composition
 * reverses the conversion.
 */

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;

use crate::errors::SubtitleError;
use crate::helpers;
use crate::subtitles::{Metadata, SubtitleLine};

pub mod srt;
pub mod ssa;
pub mod vtt;

pub use srt::SrtFileHandler;
pub use ssa::SsaFileHandler;
pub use vtt::VttFileHandler;

/// Container for subtitle lines and file-level metadata.
///
/// Encapsulates both the individual lines and any format-specific metadata
/// needed to preserve file structure across parse and compose.
#[derive(Debug, Clone, Default)]
pub struct SubtitleData {
    /// Parsed or to-be-composed lines
    pub lines: Vec<SubtitleLine>,
    /// File-level metadata (headers, styles, notes…)
    pub metadata: Metadata,
    /// First line number to use when renumbering on compose
    pub start_line_number: Option<usize>,
    /// Extension detected while parsing (e.g. ".ass" vs ".ssa")
    pub detected_format: Option<String>,
}

impl SubtitleData {
    /// Create a data container from lines alone
    pub fn with_lines(lines: Vec<SubtitleLine>) -> Self {
        SubtitleData { lines, ..SubtitleData::default() }
    }
}

/// Interface for reading and writing a concrete subtitle format.
///
/// Implementations handle format-specific concerns while the business
/// logic stays format-agnostic.
pub trait SubtitleFileHandler: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Extensions this handler claims, with a priority per extension.
    /// Higher priority wins; on a tie the later registration wins.
    fn extension_priorities(&self) -> Vec<(&'static str, i32)>;

    /// Parse subtitle content and return lines with file-level metadata
    fn parse_string(&self, content: &str) -> Result<SubtitleData, SubtitleError>;

    /// Compose subtitle lines into the on-disk format
    fn compose(&self, data: &SubtitleData) -> Result<String, SubtitleError>;

    /// Parse a subtitle file from disk, honouring `DEFAULT_ENCODING`
    fn parse_file(&self, path: &Path) -> Result<SubtitleData, SubtitleError> {
        let content = helpers::read_text_file(path)?;
        self.parse_string(&content)
    }

    /// The extensions this handler supports
    fn file_extensions(&self) -> Vec<&'static str> {
        self.extension_priorities().into_iter().map(|(ext, _)| ext).collect()
    }
}

/// Placeholder handler used before a real format is determined.
/// Refuses to parse or compose.
#[derive(Debug, Default)]
pub struct VoidFileHandler;

impl SubtitleFileHandler for VoidFileHandler {
    fn name(&self) -> &'static str {
        "void"
    }

    fn extension_priorities(&self) -> Vec<(&'static str, i32)> {
        Vec::new()
    }

    fn parse_string(&self, _content: &str) -> Result<SubtitleData, SubtitleError> {
        Err(SubtitleError::NoFileHandler("parse"))
    }

    fn compose(&self, _data: &SubtitleData) -> Result<String, SubtitleError> {
        Err(SubtitleError::NoFileHandler("compose"))
    }

    fn parse_file(&self, _path: &Path) -> Result<SubtitleData, SubtitleError> {
        Err(SubtitleError::NoFileHandler("parse"))
    }
}

/// Constructor for a registered handler
pub type HandlerFactory = fn() -> Box<dyn SubtitleFileHandler>;

struct RegisteredHandler {
    priority: i32,
    factory: HandlerFactory,
}

/// Maps lower-cased file extensions to subtitle format handlers.
///
/// An explicit registry is threaded through the project; the shared
/// default instance has the built-in handlers registered.
pub struct FormatRegistry {
    handlers: BTreeMap<String, RegisteredHandler>,
}

impl FormatRegistry {
    /// An empty registry with no handlers (the test analogue of
    /// disabling handler discovery)
    pub fn empty() -> Self {
        FormatRegistry { handlers: BTreeMap::new() }
    }

    /// A registry with the built-in SRT, VTT and SSA/ASS handlers
    pub fn with_builtin_handlers() -> Self {
        let mut registry = FormatRegistry::empty();
        registry.register(|| Box::new(SrtFileHandler));
        registry.register(|| Box::new(VttFileHandler));
        registry.register(|| Box::new(SsaFileHandler));
        registry
    }

    /// Register a handler for every extension it claims. An extension
    /// already registered is replaced when the new priority is greater
    /// than or equal to the existing one.
    pub fn register(&mut self, factory: HandlerFactory) {
        let instance = factory();
        for (extension, priority) in instance.extension_priorities() {
            let extension = normalise_extension(extension);
            let replace = self
                .handlers
                .get(&extension)
                .map(|existing| priority >= existing.priority)
                .unwrap_or(true);
            if replace {
                self.handlers.insert(extension, RegisteredHandler { priority, factory });
            }
        }
    }

    /// Instantiate a handler for the given extension
    pub fn create_handler(&self, extension: &str) -> Result<Box<dyn SubtitleFileHandler>, SubtitleError> {
        let extension = normalise_extension(extension);
        match self.handlers.get(&extension) {
            Some(registered) => Ok((registered.factory)()),
            None => Err(SubtitleError::UnknownFormat(extension)),
        }
    }

    /// Instantiate a handler for a file path's extension
    pub fn create_handler_for_path(&self, path: &Path) -> Result<Box<dyn SubtitleFileHandler>, SubtitleError> {
        match Self::format_from_path(path) {
            Some(extension) => self.create_handler(&extension),
            None => Err(SubtitleError::UnknownFormat(path.display().to_string())),
        }
    }

    /// Whether an extension is registered
    pub fn supports(&self, extension: &str) -> bool {
        self.handlers.contains_key(&normalise_extension(extension))
    }

    /// The registered extensions, sorted
    pub fn enumerate_formats(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// The lower-cased dotted extension of a path, when it has one
    pub fn format_from_path(path: &Path) -> Option<String> {
        path.extension().map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
    }
}

fn normalise_extension(extension: &str) -> String {
    let extension = extension.to_lowercase();
    if extension.starts_with('.') { extension } else { format!(".{}", extension) }
}

static DEFAULT_REGISTRY: Lazy<std::sync::Arc<FormatRegistry>> =
    Lazy::new(|| std::sync::Arc::new(FormatRegistry::with_builtin_handlers()));

/// The process-wide registry with the built-in handlers, constructed on
/// first access. Projects take a clone of the `Arc` so tests can thread an
/// explicit registry instead.
pub fn default_registry() -> std::sync::Arc<FormatRegistry> {
    std::sync::Arc::clone(&DEFAULT_REGISTRY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_void_handler_refuses_everything() {
        let handler = VoidFileHandler;
        assert!(handler.parse_string("1\n00:00:01,000 --> 00:00:02,000\nHi\n").is_err());
        assert!(handler.compose(&SubtitleData::default()).is_err());
        assert!(handler.file_extensions().is_empty());
    }

    #[test]
    fn test_builtin_registry_knows_all_formats() {
        let registry = FormatRegistry::with_builtin_handlers();
        let formats = registry.enumerate_formats();
        assert_eq!(formats, vec![".ass", ".srt", ".ssa", ".vtt"]);
    }

    #[test]
    fn test_extension_lookup_is_case_insensitive() {
        let registry = FormatRegistry::with_builtin_handlers();
        assert!(registry.create_handler("SRT").is_ok());
        assert!(registry.create_handler(".Vtt").is_ok());
        assert!(registry.create_handler(".sub").is_err());
    }

    #[test]
    fn test_later_registration_wins_on_equal_priority() {
        let mut registry = FormatRegistry::empty();
        registry.register(|| Box::new(SrtFileHandler));
        registry.register(|| Box::new(OverridingHandler));

        let handler = registry.create_handler(".srt").unwrap();
        assert_eq!(handler.name(), "override");
    }

    #[test]
    fn test_lower_priority_does_not_replace() {
        let mut registry = FormatRegistry::empty();
        registry.register(|| Box::new(SrtFileHandler));
        registry.register(|| Box::new(LowPriorityHandler));

        let handler = registry.create_handler(".srt").unwrap();
        assert_eq!(handler.name(), "srt");
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(FormatRegistry::format_from_path(Path::new("movie.SRT")), Some(".srt".to_string()));
        assert_eq!(FormatRegistry::format_from_path(Path::new("noext")), None);
    }

    #[derive(Debug)]
    struct OverridingHandler;

    impl SubtitleFileHandler for OverridingHandler {
        fn name(&self) -> &'static str {
            "override"
        }

        fn extension_priorities(&self) -> Vec<(&'static str, i32)> {
            vec![(".srt", 10)]
        }

        fn parse_string(&self, _content: &str) -> Result<SubtitleData, SubtitleError> {
            Ok(SubtitleData::default())
        }

        fn compose(&self, _data: &SubtitleData) -> Result<String, SubtitleError> {
            Ok(String::new())
        }
    }

    #[derive(Debug)]
    struct LowPriorityHandler;

    impl SubtitleFileHandler for LowPriorityHandler {
        fn name(&self) -> &'static str {
            "low"
        }

        fn extension_priorities(&self) -> Vec<(&'static str, i32)> {
            vec![(".srt", 1)]
        }

        fn parse_string(&self, _content: &str) -> Result<SubtitleData, SubtitleError> {
            Ok(SubtitleData::default())
        }

        fn compose(&self, _data: &SubtitleData) -> Result<String, SubtitleError> {
            Ok(String::new())
        }
    }
}
