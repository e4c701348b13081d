//! Error types for values, fingerprinting and configuration

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Why a value could not be fingerprinted or serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedReason {
    /// The value needs the generic byte dump but fallback serialization is turned off
    FallbackDisabled,
    /// The value offers no byte dump at all
    NotSerializable,
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FallbackDisabled => write!(f, "fallback serialization is disabled"),
            Self::NotSerializable => write!(f, "value cannot be serialized to bytes"),
        }
    }
}

/// Main error type for simmer-core
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    #[error("Unsupported value of type '{type_tag}': {reason}")]
    #[diagnostic(
        code(simmer::core::unsupported_value),
        help("Register an extension handler for this type or enable fallback serialization")
    )]
    UnsupportedValue {
        type_tag: String,
        reason: UnsupportedReason,
    },

    #[error("Recipe '{recipe}' maps over a {found}, expected a list or a map")]
    #[diagnostic(
        code(simmer::core::shape_mismatch),
        help("The first ingredient of a foreach recipe must produce a list or a map")
    )]
    ShapeMismatch { recipe: String, found: String },

    #[error("Unknown reference token '{token}'")]
    #[diagnostic(
        code(simmer::core::unknown_token),
        help("The cache was written with an extension that is no longer registered; forget the recipe to rebuild it")
    )]
    UnknownToken { token: String },

    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(simmer::core::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        #[source]
        source: std::io::Error,
        path: Option<Box<Path>>,
        operation: String,
    },

    #[error("Serialization error: {message}")]
    #[diagnostic(code(simmer::core::serialization))]
    Serialization { message: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(simmer::core::config))]
    Configuration { message: String },
}

impl Error {
    #[must_use]
    pub fn unsupported(type_tag: impl Into<String>, reason: UnsupportedReason) -> Self {
        Self::UnsupportedValue {
            type_tag: type_tag.into(),
            reason,
        }
    }

    #[must_use]
    pub fn shape_mismatch(recipe: impl Into<String>, found: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            recipe: recipe.into(),
            found: found.into(),
        }
    }

    #[must_use]
    pub fn unknown_token(token: impl Into<String>) -> Self {
        Self::UnknownToken {
            token: token.into(),
        }
    }

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

    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            path: None,
            operation: "unknown".to_string(),
        }
    }
}

/// Result type alias for simmer-core
pub type Result<T> = std::result::Result<T, Error>;
