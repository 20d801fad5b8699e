//! Error types for the extraction library.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Exit code for an invalid refresh token or client credentials.
pub const EXIT_INVALID_CREDENTIALS: u8 = 5;

/// Exit code for every other unrecoverable failure.
pub const EXIT_FAILURE: u8 = 1;

/// Main error type for extraction operations.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The identity provider rejected the refresh grant.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Token acquisition failed for a reason other than bad credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Unexpected non-success status from a metadata endpoint.
    #[error("Metadata request failed with HTTP {status}: {message}")]
    MetadataFetch { status: u16, message: String },

    /// Schema discovery produced an inconsistent stream.
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// The service refused to build a response above its payload ceiling.
    #[error("Response too large (provider code {code}): {message}")]
    OversizedResponse { code: String, message: String },

    /// Window bisection reached the minimum width and still failed.
    #[error("Window {start} .. {end} is too small to split further")]
    WindowTooSmall {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Any other failed query.
    #[error("Query failed with HTTP {status}: {message}")]
    Query { status: u16, message: String },

    /// A fetched row could not be shaped into its stream schema.
    #[error("Invalid record in stream {stream}: {message}")]
    InvalidRecord { stream: String, message: String },

    /// Bookmark state could not be read or written.
    #[error("State error: {0}")]
    State(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExtractError {
    /// Create an InvalidRecord error
    pub fn invalid_record(stream: impl Into<String>, message: impl Into<String>) -> Self {
        ExtractError::InvalidRecord {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Whether this error is the recoverable oversized-response condition.
    pub fn is_oversized(&self) -> bool {
        matches!(self, ExtractError::OversizedResponse { .. })
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            ExtractError::InvalidCredentials(_) => EXIT_INVALID_CREDENTIALS,
            _ => EXIT_FAILURE,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractError>;
