//! Recipe dependency DAG for simmer.
//!
//! This crate provides a directed acyclic graph (DAG) of named nodes built by
//! reachability from a target, using petgraph. Edges point from a dependency
//! to its dependent, so a topological order lists every node after all of
//! its dependencies.
//!
//! # Key Types
//!
//! - [`DependencyGraph`]: The graph structure for building and querying dependencies
//! - [`NodeData`]: Trait that node payloads implement to expose their dependency names
//! - [`GraphNode`]: A node in the graph containing the name and payload
//!
//! # Example
//!
//! ```ignore
//! use simmer_graph::{DependencyGraph, NodeData};
//!
//! #[derive(Clone)]
//! struct Step {
//!     ingredients: Vec<String>,
//! }
//!
//! impl NodeData for Step {
//!     fn dependency_names(&self) -> impl Iterator<Item = &str> {
//!         self.ingredients.iter().map(String::as_str)
//!     }
//! }
//!
//! let mut graph = DependencyGraph::new();
//! graph.build_for_node("report", |name| steps.get(name).cloned())?;
//! let order = graph.topological_sort()?;
//! ```

mod error;
mod graph;
mod traversal;

pub use error::{Error, Result};
pub use graph::{DependencyGraph, GraphNode};
pub use petgraph::graph::NodeIndex;
pub use traversal::{ParallelGroups, TopologicalOrder};

/// Trait for payloads stored in a [`DependencyGraph`].
pub trait NodeData: Clone {
    /// Returns the names of the nodes this node depends on, in declaration order.
    fn dependency_names(&self) -> impl Iterator<Item = &str>;
}
