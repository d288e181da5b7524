// src/error.rs

//! Unified error handling for the collector application.

use thiserror::Error;

/// Result type alias for collector operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// HTTP method not supported by the fetcher
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// The technology has no pagination descriptor but a paginated path was required
    #[error("Pagination is not configured for technology '{technology}'")]
    PaginationUnsupported { technology: String },

    /// Retries exhausted on a transient HTTP failure
    #[error("Transient fetch failure for {url} after {attempts} attempts")]
    Transient { url: String, attempts: u32 },

    /// The dependency graph of a technology scope contains a cycle
    #[error("Dependency cycle detected among sources: {}", remaining.join(", "))]
    CycleDetected { remaining: Vec<String> },

    /// A dependency result was missing when a chained source came up for execution
    #[error("Source '{source_name}' is missing the result of dependency '{dependency}'")]
    MissingDependencyResult { source_name: String, dependency: String },

    /// An extract path does not name a declared dependency or is empty
    #[error("Malformed extract path '{path}' on source '{source_name}'")]
    MalformedExtractPath { source_name: String, path: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a malformed-extract-path error.
    pub fn malformed_path(source: impl Into<String>, path: impl Into<String>) -> Self {
        Self::MalformedExtractPath {
            source_name: source.into(),
            path: path.into(),
        }
    }

    /// Create a missing-dependency-result error.
    pub fn missing_dependency(source: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::MissingDependencyResult {
            source_name: source.into(),
            dependency: dependency.into(),
        }
    }
}
