// SPDX-License-Identifier: MIT

//! Typed error handling for nl2sql-rs
//!
//! Collaborators (models, databases, resolvers) report failures through
//! [`Nl2SqlError`]. The workflow engine classifies these at each stage
//! boundary, so only construction and caller-level problems ever reach
//! the caller as an `Err`.

use std::time::Duration;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Nl2SqlError>;

/// Top-level error type for nl2sql-rs
#[derive(Debug, Error)]
pub enum Nl2SqlError {
    /// API errors from external services (OpenAI, Gemini)
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Configuration errors (missing env vars, invalid values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The database could not be reached
    #[error("Database unreachable: {0}")]
    Connectivity(String),

    /// Workflow-specific errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Model/LLM-specific errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// SQLite errors raised after a connection was established
    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Caller-supplied deadline elapsed
    #[error("Run exceeded deadline of {0:?}")]
    Timeout(Duration),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Workflow-specific errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The initial state carried no user message to answer
    #[error("Initial state contains no user message")]
    MissingUserMessage,

    /// `format_output` was requested but no formatter was supplied
    #[error("Answer formatting enabled but no formatter configured")]
    MissingFormatter,

    /// A new user message was added to a state that already concluded
    #[error("State already concluded; continue the conversation with WorkflowState::follow_up")]
    AlreadyConcluded,
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Provider not supported
    #[error("Provider not supported: {0}")]
    UnsupportedProvider(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// Model returned no text
    #[error("Model returned an empty response")]
    EmptyResponse,
}

impl Nl2SqlError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connectivity error
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether this error means the database itself could not be reached
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

impl From<&str> for Nl2SqlError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for Nl2SqlError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<tokio::task::JoinError> for Nl2SqlError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Other(format!("Blocking task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = Nl2SqlError::api("openai", "quota exceeded");
        assert_eq!(err.to_string(), "API error from openai: quota exceeded");
    }

    #[test]
    fn test_connectivity_classification() {
        assert!(Nl2SqlError::connectivity("no such file").is_connectivity());
        assert!(!Nl2SqlError::other("boom").is_connectivity());
        assert!(!Nl2SqlError::config("missing url").is_connectivity());
    }

    #[test]
    fn test_nested_errors_convert() {
        let err: Nl2SqlError = WorkflowError::MissingUserMessage.into();
        assert!(err.to_string().contains("no user message"));

        let err: Nl2SqlError = ModelError::ApiKeyMissing("gemini".into()).into();
        assert!(err.to_string().contains("gemini"));
    }
}
