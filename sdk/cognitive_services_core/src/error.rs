use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when interacting with Azure Cognitive Services.
#[derive(Error, Debug)]
pub enum CognitiveError {
    /// The request failed with an HTTP error and no structured error body.
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// The service returned a structured error response.
    #[error("API error ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Authentication could not be configured.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A payload could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP request failed at the transport level.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint URL is invalid.
    #[error("Invalid endpoint URL: {message}")]
    InvalidEndpoint {
        message: String,
        #[source]
        source: Option<url::ParseError>,
    },

    /// A required configuration value is missing.
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    /// A request builder was given invalid input.
    #[error("Invalid request: {0}")]
    Builder(String),

    /// A local file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A long-running operation reached a permanent failure state.
    #[error("Operation {operation} failed: {detail}")]
    OperationFailed { operation: String, detail: String },

    /// A long-running operation did not reach a terminal state in time.
    #[error("Operation {operation} did not complete within {waited:?}")]
    PollTimeout { operation: String, waited: Duration },
}

impl CognitiveError {
    /// Create an [`Http`](Self::Http) error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Create an [`InvalidEndpoint`](Self::InvalidEndpoint) error from a URL parse failure.
    pub fn invalid_endpoint_with_source(message: impl Into<String>, source: url::ParseError) -> Self {
        Self::InvalidEndpoint {
            message: format!("{}: {source}", message.into()),
            source: Some(source),
        }
    }

    /// The HTTP status code, if the error came from a service response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::Api { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The service error code, if the response carried one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Returns `true` if the service answered `404 Not Found`.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Result type alias for Cognitive Services operations.
pub type CognitiveResult<T> = std::result::Result<T, CognitiveError>;
