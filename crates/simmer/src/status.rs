//! Recipe status and the status evaluator.

use crate::graph::RecipeGraph;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Whether a recipe is up to date, and if not, why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    IngredientDirty,
    NotEvaluatedYet,
    InputsChanged,
    OutputsInvalid,
    BoundFunctionChanged,
    CustomDirty,
    MappedInputsDirty,
}

impl Status {
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Human-readable explanation.
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "up to date",
            Self::IngredientDirty => "an ingredient needs to be re-evaluated",
            Self::NotEvaluatedYet => "not evaluated yet",
            Self::InputsChanged => "inputs changed since the last run",
            Self::OutputsInvalid => "cached outputs were modified or removed",
            Self::BoundFunctionChanged => "the recipe function changed",
            Self::CustomDirty => "the custom cleanliness check failed",
            Self::MappedInputsDirty => "mapped elements changed or did not all complete",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "Ok",
            Self::IngredientDirty => "IngredientDirty",
            Self::NotEvaluatedYet => "NotEvaluatedYet",
            Self::InputsChanged => "InputsChanged",
            Self::OutputsInvalid => "OutputsInvalid",
            Self::BoundFunctionChanged => "BoundFunctionChanged",
            Self::CustomDirty => "CustomDirty",
            Self::MappedInputsDirty => "MappedInputsDirty",
        };
        f.write_str(name)
    }
}

/// Compute the status of every recipe in `graph`, dependencies first.
///
/// Each status is computed once and reused by every dependent. Nothing is
/// mutated.
pub(crate) fn evaluate(graph: &RecipeGraph) -> HashMap<String, Status> {
    let mut statuses: HashMap<String, Status> = HashMap::with_capacity(graph.len());
    for recipe in graph.recipes_in_order() {
        let ingredients_ok = recipe
            .ingredients()
            .iter()
            .all(|dep| statuses.get(dep.name()).is_some_and(|s| s.is_ok()));
        let status = recipe.status_given(ingredients_ok);
        tracing::trace!(recipe = %recipe.name(), status = %status, "Computed status");
        statuses.insert(recipe.name().to_string(), status);
    }
    statuses
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_reason() {
        assert_eq!(Status::MappedInputsDirty.to_string(), "MappedInputsDirty");
        assert!(Status::Ok.is_ok());
        assert!(!Status::CustomDirty.is_ok());
        assert_eq!(Status::NotEvaluatedYet.reason(), "not evaluated yet");
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&Status::BoundFunctionChanged).unwrap();
        assert_eq!(json, "\"bound_function_changed\"");
    }
}
