//! Dependency graph builder using petgraph.
//!
//! This module builds directed acyclic graphs (DAGs) of named nodes to
//! resolve dependencies and determine evaluation order.

use crate::{Error, NodeData, Result};
use petgraph::algo::{is_cyclic_directed, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{EdgeRef, IntoNodeReferences};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A node in the dependency graph.
#[derive(Debug, Clone)]
pub struct GraphNode<T> {
    /// Name of the node.
    pub name: String,
    /// The node payload.
    pub data: T,
}

/// Dependency graph for resolution and evaluation ordering.
///
/// Holds any payload implementing [`NodeData`]. Edges run from a dependency
/// to the node that depends on it.
#[derive(Debug, Clone)]
pub struct DependencyGraph<T: NodeData> {
    /// The directed graph of nodes.
    graph: DiGraph<GraphNode<T>, ()>,
    /// Map from node names to node indices.
    name_to_node: HashMap<String, NodeIndex>,
}

impl<T: NodeData> DependencyGraph<T> {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            name_to_node: HashMap::new(),
        }
    }

    /// Add a single node to the graph.
    ///
    /// If a node with the same name already exists, returns the existing index.
    pub fn add_node(&mut self, name: &str, data: T) -> NodeIndex {
        if let Some(&node) = self.name_to_node.get(name) {
            return node;
        }

        let node_index = self.graph.add_node(GraphNode {
            name: name.to_string(),
            data,
        });
        self.name_to_node.insert(name.to_string(), node_index);
        debug!("Added graph node '{}'", name);

        node_index
    }

    /// Get a reference to a node by index.
    #[must_use]
    pub fn node(&self, index: NodeIndex) -> Option<&GraphNode<T>> {
        self.graph.node_weight(index)
    }

    /// Get a reference to a node by name.
    #[must_use]
    pub fn get_node_by_name(&self, name: &str) -> Option<&GraphNode<T>> {
        self.name_to_node
            .get(name)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Add dependency edges after all nodes have been added.
    ///
    /// Repeated dependencies on the same node produce a single edge.
    ///
    /// # Errors
    ///
    /// Returns an error if any node depends on a node not in the graph.
    pub fn add_dependency_edges(&mut self) -> Result<()> {
        let mut missing_deps = Vec::new();
        let mut edges_to_add = Vec::new();

        for (node_index, node) in self.graph.node_references() {
            for dep_name in node.data.dependency_names() {
                if let Some(&dep_node_index) = self.name_to_node.get(dep_name) {
                    edges_to_add.push((dep_node_index, node_index));
                } else {
                    missing_deps.push((node.name.clone(), dep_name.to_string()));
                }
            }
        }

        if !missing_deps.is_empty() {
            return Err(Error::MissingDependencies {
                missing: missing_deps,
            });
        }

        for (from, to) in edges_to_add {
            self.graph.update_edge(from, to, ());
        }

        Ok(())
    }

    /// Check if the graph has cycles.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Fail with the names of the nodes involved if the graph has a cycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] naming every node on a cycle.
    pub fn check_acyclic(&self) -> Result<()> {
        if !self.has_cycles() {
            return Ok(());
        }
        let mut members: Vec<&str> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .flatten()
            .map(|idx| self.graph[idx].name.as_str())
            .collect();
        members.sort_unstable();
        Err(Error::CycleDetected {
            message: format!("between {}", members.join(", ")),
        })
    }

    /// Get topologically sorted list of nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains cycles.
    pub fn topological_sort(&self) -> Result<Vec<GraphNode<T>>> {
        Ok(self
            .topological_indices()?
            .into_iter()
            .map(|idx| self.graph[idx].clone())
            .collect())
    }

    /// Get node indices in topological order.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains cycles.
    pub fn topological_indices(&self) -> Result<Vec<NodeIndex>> {
        self.check_acyclic()?;

        toposort(&self.graph, None).map_err(|_| Error::TopologicalSortFailed {
            reason: "petgraph toposort failed".to_string(),
        })
    }

    /// Depth-first post-order from `target` following dependencies in the
    /// order each node declares them.
    ///
    /// This is the order in which a strictly sequential evaluator first
    /// awaits (and therefore first runs) each node. Only nodes reachable from
    /// `target` are included.
    ///
    /// # Errors
    ///
    /// Returns an error if `target` is unknown or the graph contains cycles.
    pub fn visit_order(&self, target: &str) -> Result<Vec<NodeIndex>> {
        let root = self.node_index(target).ok_or_else(|| Error::UnknownNode {
            name: target.to_string(),
        })?;
        self.check_acyclic()?;

        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut visited = HashSet::new();
        // (node, expanded) pairs; a node is emitted once its dependencies are
        let mut stack = vec![(root, false)];
        while let Some((idx, expanded)) = stack.pop() {
            if expanded {
                order.push(idx);
                continue;
            }
            if !visited.insert(idx) {
                continue;
            }
            stack.push((idx, true));
            let deps = self.dependencies(idx);
            for dep in deps.into_iter().rev() {
                if !visited.contains(&dep) {
                    stack.push((dep, false));
                }
            }
        }

        Ok(order)
    }

    /// Direct dependencies of a node, in declaration order, deduplicated.
    #[must_use]
    pub fn dependencies(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let Some(node) = self.graph.node_weight(index) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        node.data
            .dependency_names()
            .filter_map(|name| self.name_to_node.get(name).copied())
            .filter(|idx| seen.insert(*idx))
            .collect()
    }

    /// Get all nodes grouped by dependency level.
    ///
    /// Each group contains nodes that can evaluate concurrently once every
    /// earlier group has finished.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains cycles.
    pub fn get_parallel_groups(&self) -> Result<Vec<Vec<GraphNode<T>>>> {
        let sorted = self.topological_sort()?;

        if sorted.is_empty() {
            return Ok(vec![]);
        }

        let mut groups: Vec<Vec<GraphNode<T>>> = vec![];
        let mut processed: HashMap<String, usize> = HashMap::new();

        for node in sorted {
            let mut level = 0;
            for dep in node.data.dependency_names() {
                if let Some(&dep_level) = processed.get(dep) {
                    level = level.max(dep_level + 1);
                }
            }

            if level >= groups.len() {
                groups.resize(level + 1, vec![]);
            }
            processed.insert(node.name.clone(), level);
            groups[level].push(node);
        }

        Ok(groups)
    }

    /// Get the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of dependency edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All edges as `(dependency, dependent)` name pairs.
    #[must_use]
    pub fn edges(&self) -> Vec<(String, String)> {
        self.graph
            .edge_references()
            .map(|edge| {
                (
                    self.graph[edge.source()].name.clone(),
                    self.graph[edge.target()].name.clone(),
                )
            })
            .collect()
    }

    /// Check whether an edge `dependency -> dependent` exists.
    #[must_use]
    pub fn has_edge(&self, dependency: &str, dependent: &str) -> bool {
        match (self.node_index(dependency), self.node_index(dependent)) {
            (Some(from), Some(to)) => self.graph.contains_edge(from, to),
            _ => false,
        }
    }

    /// Check if a node exists in the graph.
    #[must_use]
    pub fn contains_node(&self, name: &str) -> bool {
        self.name_to_node.contains_key(name)
    }

    /// Get the node index for a node by name.
    #[must_use]
    pub fn node_index(&self, name: &str) -> Option<NodeIndex> {
        self.name_to_node.get(name).copied()
    }

    /// Iterate over all nodes in the graph.
    pub fn iter_nodes(&self) -> impl Iterator<Item = (NodeIndex, &GraphNode<T>)> {
        self.graph.node_references()
    }

    /// Build the graph for `target` and all of its transitive dependencies.
    ///
    /// Only nodes reachable from `target` are added; anything else known to
    /// `get_node` stays out of the graph.
    ///
    /// # Arguments
    ///
    /// * `target` - The name of the node to build the graph for
    /// * `get_node` - Function that returns the payload for a given name
    ///
    /// # Errors
    ///
    /// Returns an error if `target` is unknown, a dependency cannot be
    /// resolved, or the dependencies form a cycle.
    pub fn build_for_node<F>(&mut self, target: &str, mut get_node: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<T>,
    {
        let mut to_process = vec![target.to_string()];
        let mut processed = HashSet::new();

        debug!("Building graph for '{}'", target);

        while let Some(current_name) = to_process.pop() {
            if !processed.insert(current_name.clone()) {
                continue;
            }

            if let Some(data) = get_node(&current_name) {
                let deps: Vec<String> = data.dependency_names().map(String::from).collect();

                self.add_node(&current_name, data);

                for dep in deps {
                    if !processed.contains(&dep) {
                        to_process.push(dep);
                    }
                }
            } else if current_name == target {
                return Err(Error::UnknownNode {
                    name: target.to_string(),
                });
            } else {
                debug!("Node '{}' not found while building graph", current_name);
            }
        }

        self.add_dependency_edges()?;
        self.check_acyclic()
    }
}

impl<T: NodeData> Default for DependencyGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default)]
    struct TestNode {
        deps: Vec<String>,
    }

    impl TestNode {
        fn new(deps: &[&str]) -> Self {
            Self {
                deps: deps.iter().map(|s| (*s).to_string()).collect(),
            }
        }
    }

    impl NodeData for TestNode {
        fn dependency_names(&self) -> impl Iterator<Item = &str> {
            self.deps.iter().map(String::as_str)
        }
    }

    fn catalog(entries: &[(&str, &[&str])]) -> HashMap<String, TestNode> {
        entries
            .iter()
            .map(|(name, deps)| ((*name).to_string(), TestNode::new(deps)))
            .collect()
    }

    #[test]
    fn test_graph_new() {
        let graph: DependencyGraph<TestNode> = DependencyGraph::new();
        assert_eq!(graph.node_count(), 0);
        assert!(!graph.has_cycles());
    }

    #[test]
    fn test_add_node_is_idempotent() {
        let mut graph = DependencyGraph::new();
        let first = graph.add_node("a", TestNode::new(&[]));
        let second = graph.add_node("a", TestNode::new(&["ignored"]));
        assert_eq!(first, second);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_dependencies_order_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a", TestNode::new(&[]));
        graph.add_node("b", TestNode::new(&["a"]));
        graph.add_node("c", TestNode::new(&["b"]));
        graph.add_dependency_edges().unwrap();

        let sorted = graph.topological_sort().unwrap();
        let names: Vec<_> = sorted.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(graph.has_edge("a", "b"));
        assert!(!graph.has_edge("b", "a"));
    }

    #[test]
    fn test_repeated_dependency_single_edge() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a", TestNode::new(&[]));
        graph.add_node("b", TestNode::new(&["a", "a"]));
        graph.add_dependency_edges().unwrap();

        assert_eq!(graph.edge_count(), 1);
        let b = graph.node_index("b").unwrap();
        assert_eq!(graph.dependencies(b).len(), 1);
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a", TestNode::new(&["c"]));
        graph.add_node("b", TestNode::new(&["a"]));
        graph.add_node("c", TestNode::new(&["b"]));
        graph.add_dependency_edges().unwrap();

        assert!(graph.has_cycles());
        assert!(graph.topological_sort().is_err());
    }

    #[test]
    fn test_missing_dependency() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a", TestNode::new(&["ghost"]));
        let err = graph.add_dependency_edges().unwrap_err();
        assert_eq!(
            err,
            Error::MissingDependencies {
                missing: vec![("a".to_string(), "ghost".to_string())]
            }
        );
    }

    #[test]
    fn test_diamond_parallel_groups() {
        let mut graph = DependencyGraph::new();
        //     a
        //    / \
        //   b   c
        //    \ /
        //     d
        graph.add_node("a", TestNode::new(&[]));
        graph.add_node("b", TestNode::new(&["a"]));
        graph.add_node("c", TestNode::new(&["a"]));
        graph.add_node("d", TestNode::new(&["b", "c"]));
        graph.add_dependency_edges().unwrap();

        let groups = graph.get_parallel_groups().unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].len(), 1);
        assert_eq!(groups[1].len(), 2);
        assert_eq!(groups[2].len(), 1);
    }

    #[test]
    fn test_build_for_node_excludes_unrelated() {
        let nodes = catalog(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["b"]),
            ("unrelated", &["a"]),
        ]);

        let mut graph = DependencyGraph::new();
        graph
            .build_for_node("c", |name| nodes.get(name).cloned())
            .unwrap();

        assert_eq!(graph.node_count(), 3);
        assert!(graph.contains_node("a"));
        assert!(!graph.contains_node("unrelated"));
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_build_for_unknown_target() {
        let nodes = catalog(&[("a", &[])]);
        let mut graph = DependencyGraph::new();
        let err = graph
            .build_for_node("zzz", |name| nodes.get(name).cloned())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownNode { name } if name == "zzz"));
    }

    #[test]
    fn test_build_for_node_rejects_cycles() {
        let nodes = catalog(&[("a", &["b"]), ("b", &["a"])]);
        let mut graph = DependencyGraph::new();
        let err = graph
            .build_for_node("a", |name| nodes.get(name).cloned())
            .unwrap_err();
        assert_eq!(
            err,
            Error::CycleDetected {
                message: "between a, b".to_string()
            }
        );
    }

    #[test]
    fn test_visit_order_follows_declaration_order() {
        let nodes = catalog(&[
            ("a", &[]),
            ("b", &[]),
            ("ab", &["a", "b"]),
            ("root", &["ab", "b"]),
        ]);
        let mut graph = DependencyGraph::new();
        graph
            .build_for_node("root", |name| nodes.get(name).cloned())
            .unwrap();

        let order: Vec<_> = graph
            .visit_order("root")
            .unwrap()
            .into_iter()
            .map(|idx| graph.node(idx).unwrap().name.clone())
            .collect();
        assert_eq!(order, vec!["a", "b", "ab", "root"]);
    }
}
