//! Error types for resource synthesis and label persistence.
//!
//! Defines custom error types with classification for retry behavior.

use thiserror::Error;

/// Error type for dse-operator operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Write rejected because the stored object changed since it was read
    #[error("Conflict writing {0}: object was modified, re-read and retry")]
    Conflict(String),

    /// Node configuration could not be rendered
    #[error("Config render error: {0}")]
    ConfigRender(String),

    /// No server image is known for the requested DSE version
    #[error("Unsupported DSE version: {0}")]
    UnsupportedVersion(String),

    /// A configured port is not a valid port number
    #[error("Invalid {name} port: {value}")]
    InvalidPort {
        /// Port name
        name: String,
        /// Offending value
        value: String,
    },

    /// Missing required field in resource
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Validation error in resource spec
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Writing the operator progress label failed
    #[error("Failed to set progress label to {value}: {source}")]
    ProgressLabel {
        /// Label value that was being written
        value: String,
        /// Underlying write failure
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(e)) => e.code == 404,
            Error::ProgressLabel { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is an optimistic-concurrency conflict.
    ///
    /// Callers should re-read the object and retry.
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::Kube(kube::Error::Api(e)) => e.code == 409,
            Error::ProgressLabel { source, .. } => source.is_conflict(),
            _ => false,
        }
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::Kube(e) => {
                // Retry on conflicts, network errors, rate limiting, and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err)
                        if api_err.code >= 500 || api_err.code == 429 || api_err.code == 409
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::ProgressLabel { source, .. } => source.is_retryable(),
            Error::ConfigRender(_)
            | Error::UnsupportedVersion(_)
            | Error::InvalidPort { .. }
            | Error::MissingField(_)
            | Error::Validation(_)
            | Error::Serialization(_) => false,
        }
    }
}

/// Result type alias for dse-operator operations
pub type Result<T> = std::result::Result<T, Error>;
