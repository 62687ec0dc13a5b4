//! Error hierarchy for RET.

use thiserror::Error;

/// Errors from the HTTP transport underneath an event source.
///
/// These never reach event source consumers: a failed request or read
/// collapses the connection back to [`Phase::Closed`](crate::Phase::Closed).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid UTF-8 in event stream: {0}")]
    Decode(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),
}

/// Fatal errors raised while constructing an event source.
#[derive(Debug, Error)]
pub enum EventSourceError {
    #[error("Invalid event source URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file parse error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Missing required configuration: {key}")]
    MissingKey { key: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}
