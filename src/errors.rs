/*!
 * Error types for the llm-subtrans library.
 *
 * This module contains custom error types for different parts of the pipeline,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Request exceeded the configured timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Account quota or billing limit reached
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The model explicitly refused to produce a translation
    #[error("Model refused the request: {0}")]
    Refused(String),
}

impl ProviderError {
    /// Whether the batch translator should retry this error with backoff.
    ///
    /// Connection problems, timeouts, rate limits and 5xx responses are
    /// transient; authentication, quota and refusals are terminal. A 429
    /// never reaches `ApiError`, it is mapped to `RateLimitExceeded` or
    /// `QuotaExceeded` at the client boundary.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::ConnectionError(_)
            | ProviderError::Timeout(_)
            | ProviderError::RateLimitExceeded(_) => true,
            ProviderError::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

/// Errors that can occur during subtitle processing
#[derive(Error, Debug)]
pub enum SubtitleError {
    /// Malformed subtitle file or project content
    #[error("Failed to parse subtitles: {message}")]
    ParseError {
        /// Description of the problem
        message: String,
        /// Line number in the source file, when known
        line: Option<usize>,
    },

    /// No handler registered for the requested format
    #[error("Unknown subtitle format: {0}")]
    UnknownFormat(String),

    /// The void handler was asked to do real work
    #[error("No subtitle format handler has been assigned ({0})")]
    NoFileHandler(&'static str),

    /// Failure while composing subtitle output
    #[error("Failed to compose subtitles: {0}")]
    ComposeError(String),

    /// An operation that would corrupt the subtitle tree
    #[error("Invalid subtitle operation: {0}")]
    InvariantViolation(String),

    /// Error in the project lifecycle (missing paths, bad output format)
    #[error("Project error: {0}")]
    ProjectError(String),

    /// File system failure
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),
}

impl SubtitleError {
    /// Construct a parse error without position information
    pub fn parse(message: impl Into<String>) -> Self {
        SubtitleError::ParseError { message: message.into(), line: None }
    }

    /// Construct a parse error with a source line number
    pub fn parse_at(message: impl Into<String>, line: usize) -> Self {
        SubtitleError::ParseError { message: message.into(), line: Some(line) }
    }
}

/// Errors that can occur during translation
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error with subtitle processing
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// The response could not be aligned with the originals after all retries
    #[error("Translation misaligned after {attempts} attempts: {}", errors.join("; "))]
    Misaligned {
        /// Number of attempts made
        attempts: u32,
        /// Validation problems from the final attempt
        errors: Vec<String>,
    },

    /// Translation was cancelled by the user
    #[error("Translation aborted")]
    Aborted,
}

impl TranslationError {
    /// Whether the error represents a user-requested cancellation
    pub fn is_aborted(&self) -> bool {
        matches!(self, TranslationError::Aborted)
    }
}
