//! Core error type.

/// Errors produced while loading or compiling configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid rule pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
