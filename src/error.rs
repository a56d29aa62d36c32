//! Error types for the Prism Gateway

use thiserror::Error;

/// Main error type for gateway operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or missing process configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential issuance or lookup failure
    #[error("credential error: {0}")]
    Credentials(String),

    /// Transport-level failure talking to a cluster API
    #[error("request to {path} failed: {source}")]
    Http {
        /// API path the request was issued against
        path: String,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// Cluster API answered with a non-success status
    #[error("request to {path} returned status {status}")]
    Api {
        /// API path the request was issued against
        path: String,
        /// HTTP status code of the response
        status: u16,
    },

    /// Upstream response did not match the expected schema
    #[error("schema error: {0}")]
    Schema(String),

    /// Invalid collector field-mapping configuration
    #[error("mapping error: {0}")]
    Mapping(String),

    /// Collector registration or scrape failure
    #[error("collector error: {0}")]
    Collector(String),

    /// An operation exceeded its deadline
    #[error("{0} timed out")]
    Timeout(String),

    /// I/O error from the HTTP front door
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a credential error with the given message
    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::Credentials(msg.into())
    }

    /// Create a transport error for the given API path
    pub fn http(path: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            path: path.into(),
            source,
        }
    }

    /// Create a non-success status error for the given API path
    pub fn api(path: impl Into<String>, status: u16) -> Self {
        Self::Api {
            path: path.into(),
            status,
        }
    }

    /// Create a schema error with the given message
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create a mapping error with the given message
    pub fn mapping(msg: impl Into<String>) -> Self {
        Self::Mapping(msg.into())
    }

    /// Create a collector error with the given message
    pub fn collector(msg: impl Into<String>) -> Self {
        Self::Collector(msg.into())
    }

    /// Create a timeout error naming the operation that expired
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout(operation.into())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Self::Collector(err.to_string())
    }
}
