//! Property-based tests for dependency graph invariants.
//!
//! - Topological order and visit order respect every dependency
//! - Building for a target includes exactly the nodes reachable from it
//! - Parallel groups contain only independent nodes

use proptest::prelude::*;
use simmer_graph::{DependencyGraph, NodeData};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug)]
struct PropNode {
    deps: Vec<String>,
}

impl NodeData for PropNode {
    fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.deps.iter().map(String::as_str)
    }
}

fn node_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}".prop_map(String::from)
}

/// Generate a DAG where each node may only depend on nodes generated before it.
fn dag_strategy(min: usize, max: usize) -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
    (min..=max).prop_flat_map(|count| {
        proptest::collection::vec(node_name_strategy(), count).prop_flat_map(move |names| {
            let unique: Vec<String> = names
                .into_iter()
                .enumerate()
                .map(|(i, name)| format!("{name}_{i}"))
                .collect();

            let dep_strategies: Vec<_> = (0..count)
                .map(|i| {
                    if i == 0 {
                        Just(vec![]).boxed()
                    } else {
                        proptest::collection::vec(
                            proptest::sample::select(unique[..i].to_vec()),
                            0..=i.min(3),
                        )
                        .prop_map(|deps| {
                            let mut seen = HashSet::new();
                            deps.into_iter().filter(|d| seen.insert(d.clone())).collect()
                        })
                        .boxed()
                    }
                })
                .collect();

            let names = unique.clone();
            dep_strategies
                .prop_map(move |all_deps| names.iter().cloned().zip(all_deps).collect::<Vec<_>>())
        })
    })
}

fn build_graph(nodes: &[(String, Vec<String>)]) -> DependencyGraph<PropNode> {
    let mut graph = DependencyGraph::new();
    for (name, deps) in nodes {
        graph.add_node(name, PropNode { deps: deps.clone() });
    }
    graph.add_dependency_edges().expect("edges should resolve");
    graph
}

fn reachable(nodes: &[(String, Vec<String>)], target: &str) -> HashSet<String> {
    let deps: HashMap<&str, &Vec<String>> =
        nodes.iter().map(|(name, deps)| (name.as_str(), deps)).collect();
    let mut seen = HashSet::new();
    let mut frontier = vec![target.to_string()];
    while let Some(name) = frontier.pop() {
        if seen.insert(name.clone()) {
            frontier.extend(deps[name.as_str()].iter().cloned());
        }
    }
    seen
}

proptest! {
    #[test]
    fn topological_sort_respects_dependencies(nodes in dag_strategy(1, 15)) {
        let graph = build_graph(&nodes);
        let sorted = graph.topological_sort().expect("DAG sorts");
        let positions: HashMap<String, usize> = sorted
            .iter()
            .enumerate()
            .map(|(i, node)| (node.name.clone(), i))
            .collect();

        prop_assert_eq!(sorted.len(), nodes.len());
        for (name, deps) in &nodes {
            for dep in deps {
                prop_assert!(positions[dep] < positions[name]);
            }
        }
    }

    #[test]
    fn build_for_node_includes_exactly_reachable(nodes in dag_strategy(1, 15)) {
        let target = nodes.last().map(|(name, _)| name.clone()).expect("non-empty");
        let catalog: HashMap<String, PropNode> = nodes
            .iter()
            .map(|(name, deps)| (name.clone(), PropNode { deps: deps.clone() }))
            .collect();

        let mut graph = DependencyGraph::new();
        graph
            .build_for_node(&target, |name| catalog.get(name).cloned())
            .expect("graph builds");

        let expected = reachable(&nodes, &target);
        let actual: HashSet<String> = graph.iter_nodes().map(|(_, n)| n.name.clone()).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn visit_order_respects_dependencies(nodes in dag_strategy(1, 15)) {
        let target = nodes.last().map(|(name, _)| name.clone()).expect("non-empty");
        let catalog: HashMap<String, PropNode> = nodes
            .iter()
            .map(|(name, deps)| (name.clone(), PropNode { deps: deps.clone() }))
            .collect();
        let mut graph = DependencyGraph::new();
        graph
            .build_for_node(&target, |name| catalog.get(name).cloned())
            .expect("graph builds");

        let order = graph.visit_order(&target).expect("visit order");
        prop_assert_eq!(order.len(), graph.node_count());
        prop_assert_eq!(&graph.node(*order.last().expect("non-empty")).expect("node").name, &target);

        let positions: HashMap<String, usize> = order
            .iter()
            .enumerate()
            .map(|(i, idx)| (graph.node(*idx).expect("node").name.clone(), i))
            .collect();
        for (name, node) in graph.iter_nodes().map(|(_, n)| (n.name.clone(), n.data.clone())) {
            for dep in &node.deps {
                prop_assert!(positions[dep] < positions[&name]);
            }
        }
    }

    #[test]
    fn parallel_groups_have_no_internal_dependencies(nodes in dag_strategy(2, 15)) {
        let graph = build_graph(&nodes);
        let groups = graph.get_parallel_groups().expect("groups");
        let dep_map: HashMap<&str, &Vec<String>> =
            nodes.iter().map(|(name, deps)| (name.as_str(), deps)).collect();

        let mut level: HashMap<String, usize> = HashMap::new();
        for (i, group) in groups.iter().enumerate() {
            for node in group {
                prop_assert!(level.insert(node.name.clone(), i).is_none());
            }
        }
        prop_assert_eq!(level.len(), nodes.len());
        for (name, deps) in dep_map {
            for dep in deps {
                prop_assert!(level[dep] < level[name]);
            }
        }
    }
}
