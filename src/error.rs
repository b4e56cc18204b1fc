//! Error types for db-courier.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

/// Main error type for dispatcher operations.
#[derive(Error, Debug)]
pub enum CourierError {
    /// Database connection errors (host unreachable, auth failed, link dropped, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement execution errors (syntax errors, constraint violations, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors (invalid config file, bad field values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The dispatcher is disabled; nothing can be submitted.
    #[error("Dispatcher is disabled")]
    Disabled,

    /// The submitting scope has already ended.
    #[error("Query scope has already ended")]
    ScopeEnded,

    /// Formatting the query text failed.
    #[error("Query formatting failed")]
    Format,
}

impl CourierError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::Disabled => "Dispatcher Disabled",
            Self::ScopeEnded => "Scope Ended",
            Self::Format => "Format Error",
        }
    }
}

/// Result type alias using CourierError.
pub type Result<T> = std::result::Result<T, CourierError>;
