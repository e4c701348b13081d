//! Error types for dependency graph operations.

use std::fmt;

/// Result type for dependency graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during dependency graph operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A dependency cycle was detected in the graph.
    CycleDetected {
        /// Human-readable description of the cycle.
        message: String,
    },

    /// The node a graph was requested for does not exist.
    UnknownNode {
        /// The requested node name.
        name: String,
    },

    /// One or more nodes depend on nodes that don't exist.
    MissingDependencies {
        /// List of (node, missing_dependency) pairs.
        missing: Vec<(String, String)>,
    },

    /// Failed to perform topological sort.
    TopologicalSortFailed {
        /// Reason for the failure.
        reason: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CycleDetected { message } => {
                write!(f, "Cycle detected in dependency graph: {message}")
            }
            Self::UnknownNode { name } => {
                write!(f, "Node '{name}' is not known to the graph builder")
            }
            Self::MissingDependencies { missing } => {
                let list = missing
                    .iter()
                    .map(|(node, dep)| format!("'{node}' depends on missing '{dep}'"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "Missing dependencies: {list}")
            }
            Self::TopologicalSortFailed { reason } => {
                write!(f, "Failed to sort nodes topologically: {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}
