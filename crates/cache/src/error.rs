//! Error types for the cache crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for cache operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Fingerprinting or value model error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] simmer_core::Error),

    /// I/O error during cache operations
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(simmer::cache::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "create")
        operation: String,
    },

    /// A persisted representation that does not have the expected structure
    #[error("Malformed representation: {message}")]
    #[diagnostic(
        code(simmer::cache::malformed),
        help("The cache entry may be corrupt; forget the recipe to rebuild it")
    )]
    Malformed {
        /// What was wrong with it
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(simmer::cache::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },
}

impl Error {
    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create a malformed representation error
    #[must_use]
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed {
            message: msg.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;
