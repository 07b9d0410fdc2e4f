//! Error types for the voice command gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice command gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio buffering or container conversion error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech was heard but nothing could be recognized (noise, silence)
    #[error("speech not recognized")]
    Unrecognized,

    /// Recognition service could not be reached or rejected the request
    #[error("recognition service unavailable: {0}")]
    ServiceUnavailable(String),

    /// No handler is registered under the command name or its alias
    #[error("no handler registered for command: {0}")]
    HandlerNotFound(String),

    /// A required handler parameter had no supplied value and no default
    #[error("command {command} is missing required parameter {parameter}")]
    MissingParameter {
        /// Canonical command name
        command: String,
        /// Declared parameter name
        parameter: String,
    },

    /// The invoking member has no usable voice context (not in a voice channel)
    #[error("voice context missing: {0}")]
    VoiceContextMissing(String),

    /// A command handler failed while running
    #[error("{0}")]
    Handler(String),

    /// Text channel error
    #[error("channel error: {0}")]
    Channel(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error is an expected outcome that should stay out of the logs
    #[must_use]
    pub const fn is_quiet(&self) -> bool {
        matches!(self, Self::Unrecognized)
    }
}
