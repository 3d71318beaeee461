//! # Error Handling
//!
//! Error types for the routeplane control plane, built with `thiserror`.
//! Partial-entry problems found while building the resource graph are not
//! errors; they surface as [`crate::xds::model::BuildWarning`] values instead.

/// Custom result type for routeplane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the routeplane control plane
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed administrative input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Structural rejection of a snapshot at publish time
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Network transport errors (gRPC, HTTP)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new snapshot error
    pub fn snapshot<S: Into<String>>(message: S) -> Self {
        Self::Snapshot(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}
