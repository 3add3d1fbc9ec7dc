//! Error types for the webhost crate

use thiserror::Error;

/// Main error type for host operations
#[derive(Debug, Error)]
pub enum WebError {
    /// Resource loading errors
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
    /// Scripting bridge errors
    #[error("script error: {0}")]
    Script(#[from] ScriptError),
    /// Document construction errors
    #[error("document error: {0}")]
    Document(String),
    /// Disk cache errors
    #[error("cache error: {0}")]
    Cache(String),
    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),
    /// Malformed URL
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resource loading errors
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The URL scheme has no loader
    #[error("unsupported scheme `{0}`")]
    UnsupportedScheme(String),
    /// A `res:` lookup failed
    #[error("resource `{0}` not found")]
    ResourceNotFound(String),
    /// Non-success HTTP status
    #[error("HTTP {0} for {1}")]
    Http(u16, String),
    /// Transport failure reported by the HTTP client
    #[error("request failed: {0}")]
    Request(String),
    /// Malformed `data:` URL
    #[error("malformed data url: {0}")]
    DataUrl(String),
    /// Body was not valid UTF-8
    #[error("response for {0} is not valid UTF-8")]
    Encoding(String),
}

/// Scripting bridge errors
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Evaluation produced the exception sentinel
    #[error("{0}")]
    Execution(String),
    /// The evaluation context could not be built
    #[error("context setup failed: {0}")]
    Context(String),
    /// Class registration or prototype construction failed
    #[error("class `{name}`: {message}")]
    Class { name: &'static str, message: String },
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Http(
                status.as_u16(),
                err.url().map(|u| u.to_string()).unwrap_or_default(),
            ),
            None => Self::Request(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for WebError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.into())
    }
}

/// Convenience Result type for host operations
pub type Result<T> = std::result::Result<T, WebError>;
