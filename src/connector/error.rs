//! Unified error taxonomy for all connectors
//!
//! Backend-native failures are caught at the connector boundary and re-raised
//! as one of these variants; callers never see a driver error type directly,
//! though the original cause is preserved as the error source.

use thiserror::Error;

/// Errors surfaced by connectors, the facade and the bulk adapters
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Backend unreachable, or an operation was invoked before `connect`
    #[error("connection error: {0}")]
    Connection(String),

    /// Missing or invalid required setting
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Generic operation failure wrapping a backend-native error
    #[error("{context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Operation not supported by this backend
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// Facade used before a connector was attached
    #[error("no connector bound; call bind() before performing operations")]
    NotBound,
}

impl ConnectorError {
    /// Wrap a backend-native error, keeping it as the source
    pub fn backend(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        ConnectorError::Backend {
            context: context.into(),
            source: source.into(),
        }
    }
}

/// Result type alias for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;
