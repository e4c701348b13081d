//! Engine error types

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use simmer_core::BoxError;
use thiserror::Error;

/// Error type for engine operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Fingerprinting, value model or configuration error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] simmer_core::Error),

    /// Persistence error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] simmer_cache::Error),

    /// Dependency graph could not be built or ordered
    #[error("Recipe graph error: {0}")]
    #[diagnostic(code(simmer::engine::graph))]
    Graph(#[from] simmer_graph::Error),

    /// A recipe with this name is already registered
    #[error("Recipe '{name}' is already defined")]
    #[diagnostic(
        code(simmer::engine::duplicate_recipe),
        help("Recipe names are unique per engine; pick another name or reuse the existing recipe")
    )]
    DuplicateRecipe {
        /// The conflicting name
        name: String,
    },

    /// No recipe with this name is registered
    #[error("Unknown recipe '{name}'")]
    #[diagnostic(code(simmer::engine::unknown_recipe))]
    UnknownRecipe {
        /// The requested name
        name: String,
    },

    /// A worker task panicked or was cancelled
    #[error("Recipe worker failed: {message}")]
    #[diagnostic(code(simmer::engine::join))]
    Join {
        /// Description of the failure
        message: String,
    },

    /// A recipe's function returned an error
    #[error("Recipe '{recipe}' failed: {source}")]
    #[diagnostic(code(simmer::engine::recipe_failed))]
    Recipe {
        /// Name of the failing recipe
        recipe: String,
        /// The error returned by the recipe's function, untouched
        #[source]
        source: BoxError,
    },
}

impl Error {
    #[must_use]
    pub fn duplicate_recipe(name: impl Into<String>) -> Self {
        Self::DuplicateRecipe { name: name.into() }
    }

    #[must_use]
    pub fn unknown_recipe(name: impl Into<String>) -> Self {
        Self::UnknownRecipe { name: name.into() }
    }

    #[must_use]
    pub fn join(message: impl Into<String>) -> Self {
        Self::Join {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn recipe(recipe: impl Into<String>, source: BoxError) -> Self {
        Self::Recipe {
            recipe: recipe.into(),
            source,
        }
    }

    /// Name of the failing recipe, if a recipe's function failed.
    #[must_use]
    pub fn failed_recipe(&self) -> Option<&str> {
        match self {
            Self::Recipe { recipe, .. } => Some(recipe),
            _ => None,
        }
    }

    /// The user's original error, if a recipe's function failed.
    ///
    /// Any other error is returned unchanged.
    pub fn into_user_error(self) -> std::result::Result<BoxError, Self> {
        match self {
            Self::Recipe { source, .. } => Ok(source),
            other => Err(other),
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
