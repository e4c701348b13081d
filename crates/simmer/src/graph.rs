//! The dependency graph of one target recipe.

use crate::error::{Error, Result};
use crate::recipe::Recipe;
use simmer_graph::DependencyGraph;
use std::collections::HashMap;

/// A target recipe and everything it transitively depends on.
///
/// Built by walking ingredient handles from the target, so recipes that are
/// registered but not reachable never appear.
#[derive(Debug, Clone)]
pub struct RecipeGraph {
    target: String,
    graph: DependencyGraph<Recipe>,
    order: Vec<Recipe>,
}

impl RecipeGraph {
    pub(crate) fn build(target: &Recipe) -> Result<Self> {
        let mut reachable: HashMap<String, Recipe> = HashMap::new();
        let mut stack = vec![target.clone()];
        while let Some(recipe) = stack.pop() {
            if let Some(existing) = reachable.get(recipe.name()) {
                if *existing != recipe {
                    return Err(Error::duplicate_recipe(recipe.name()));
                }
                continue;
            }
            stack.extend(recipe.ingredients().iter().cloned());
            reachable.insert(recipe.name().to_string(), recipe);
        }

        let mut graph = DependencyGraph::new();
        graph.build_for_node(target.name(), |name| reachable.get(name).cloned())?;
        let order = graph
            .topological_sort()?
            .into_iter()
            .map(|node| node.data)
            .collect();

        tracing::debug!(
            target = %target.name(),
            recipes = graph.node_count(),
            edges = graph.edge_count(),
            "Built recipe graph"
        );
        Ok(Self {
            target: target.name().to_string(),
            graph,
            order,
        })
    }

    /// Name of the recipe this graph was built for.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.graph.contains_node(name)
    }

    #[must_use]
    pub fn recipe(&self, name: &str) -> Option<&Recipe> {
        self.graph.get_node_by_name(name).map(|node| &node.data)
    }

    /// Recipes with every recipe after its ingredients.
    pub(crate) fn recipes_in_order(&self) -> &[Recipe] {
        &self.order
    }

    /// Recipe names in topological order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.order.iter().map(|r| r.name().to_string()).collect()
    }

    /// Edges as `(ingredient, dependent)` name pairs.
    #[must_use]
    pub fn edges(&self) -> Vec<(String, String)> {
        self.graph.edges()
    }

    /// Whether `dependent` directly consumes `ingredient`.
    #[must_use]
    pub fn has_edge(&self, ingredient: &str, dependent: &str) -> bool {
        self.graph.has_edge(ingredient, dependent)
    }

    /// Recipe names grouped by dependency level. Recipes within a level do
    /// not depend on each other.
    pub fn levels(&self) -> Result<Vec<Vec<String>>> {
        Ok(self
            .graph
            .get_parallel_groups()?
            .into_iter()
            .map(|group| group.into_iter().map(|node| node.name).collect())
            .collect())
    }

    /// Recipes in the order a sequential evaluation of the target first
    /// reaches them: depth first, ingredients in declared order.
    pub(crate) fn visit_order(&self) -> Result<Vec<Recipe>> {
        Ok(self
            .graph
            .visit_order(&self.target)?
            .into_iter()
            .filter_map(|idx| self.graph.node(idx).map(|node| node.data.clone()))
            .collect())
    }
}
