//! Traversal result types for dependency graphs.

use crate::GraphNode;

/// A topologically sorted sequence of nodes.
///
/// Every node appears after all of the nodes it depends on.
pub type TopologicalOrder<T> = Vec<GraphNode<T>>;

/// Groups of nodes that can execute in parallel.
///
/// Each inner vector contains nodes with no dependencies on each other. The
/// outer vector is ordered by dependency level: everything in group N depends
/// only on nodes from groups before N.
pub type ParallelGroups<T> = Vec<Vec<GraphNode<T>>>;
