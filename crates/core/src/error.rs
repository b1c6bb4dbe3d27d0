//! Error types for the event store
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for event store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the event store
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (journal files, config files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored data could not be interpreted
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A record was built without a required field
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The store is configured with `max_events = 0` and refuses to open
    #[error("Event store is disabled (max_events = 0)")]
    Disabled,

    /// Persistent queue failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal failure (thread spawn, poisoned state)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a corruption error
    pub fn corruption(message: impl Into<String>) -> Self {
        Error::Corruption(message.into())
    }

    /// Create a queue error
    pub fn queue(message: impl Into<String>) -> Self {
        Error::Queue(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
