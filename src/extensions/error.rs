//! Error types for the extension system.

use thiserror::Error;

/// Errors raised by the sandboxed fetch bridge.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network access to '{host}' not allowed")]
    DomainNotAllowed { host: String },

    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Failed to read response body: {0}")]
    Body(#[from] std::io::Error),
}

/// Errors a content source may report to the host.
///
/// Only `get_details` surfaces these; every other method downgrades them to
/// its empty or sentinel result.
#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("{message}")]
    NotFound { id: String, message: String },

    #[error(transparent)]
    Transport(#[from] FetchError),

    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("Invalid id '{0}'")]
    InvalidId(String),

    #[error("JavaScript error: {0}")]
    JavaScript(String),
}

impl From<serde_json::Error> for ExtensionError {
    fn from(e: serde_json::Error) -> Self {
        ExtensionError::MalformedResponse(e.to_string())
    }
}

/// Result type for extension operations.
pub type ExtensionResult<T> = Result<T, ExtensionError>;
