//! Recipes: named graph nodes wrapping a bound function.

use crate::engine::{Context, Engine};
use crate::error::{Error, Result};
use crate::foreach::ForeachState;
use crate::status::Status;
use simmer_cache::{Output, RecipeRecord, Store, cache};
use simmer_core::{Fingerprint, Fingerprinter, Function, Value};
use simmer_graph::NodeData;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Custom cleanliness predicate. Receives the last known outputs.
pub type CleanCheck = dyn Fn(&[Output]) -> bool + Send + Sync;

/// Handle to a registered recipe. Cheap to clone.
#[derive(Clone)]
pub struct Recipe {
    pub(crate) inner: Arc<Node>,
}

pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) namespace: String,
    pub(crate) function: Function,
    pub(crate) function_fingerprint: Fingerprint,
    /// For foreach recipes the first ingredient is the mapped input.
    pub(crate) ingredients: Vec<Recipe>,
    pub(crate) foreach: bool,
    pub(crate) transient: bool,
    pub(crate) cache: bool,
    pub(crate) is_clean: Option<Arc<CleanCheck>>,
    pub(crate) ctx: Arc<Context>,
    pub(crate) state: Mutex<NodeState>,
}

/// What a recipe remembers about its last evaluation.
#[derive(Clone, Default)]
pub(crate) struct NodeState {
    pub(crate) outputs: Vec<Output>,
    /// Fingerprint of the value dependents receive; `None` until first evaluated.
    pub(crate) output_fingerprint: Option<Fingerprint>,
    pub(crate) input_fingerprints: Vec<Fingerprint>,
    pub(crate) function_fingerprint: Option<Fingerprint>,
    pub(crate) foreach: Option<ForeachState>,
}

impl Recipe {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    #[must_use]
    pub fn ingredients(&self) -> &[Self] {
        &self.inner.ingredients
    }

    #[must_use]
    pub fn function(&self) -> &Function {
        &self.inner.function
    }

    #[must_use]
    pub fn is_foreach(&self) -> bool {
        self.inner.foreach
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.inner.transient
    }

    /// Whether this recipe persists its state.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.store().is_some()
    }

    /// Directory holding this recipe's record and side files, if it persists state.
    #[must_use]
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.store()
            .map(|store| store.recipe_dir(&self.inner.namespace, &self.inner.name))
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, NodeState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn store(&self) -> Option<&Store> {
        if self.inner.cache {
            self.inner.ctx.store.as_ref()
        } else {
            None
        }
    }

    pub(crate) fn fingerprinter(&self) -> &Arc<Fingerprinter> {
        &self.inner.ctx.fingerprinter
    }

    /// Fingerprint of the value dependents receive, if evaluated.
    #[must_use]
    pub fn output_fingerprint(&self) -> Option<Fingerprint> {
        self.state().output_fingerprint.clone()
    }

    /// Fingerprints of the ingredients' values as of the last evaluation.
    #[must_use]
    pub fn input_fingerprints(&self) -> Vec<Fingerprint> {
        self.state().input_fingerprints.clone()
    }

    /// The last known outputs. For a foreach recipe, the completed elements'
    /// outputs in element order.
    #[must_use]
    pub fn outputs(&self) -> Vec<Output> {
        let state = self.state();
        match &state.foreach {
            Some(foreach) => foreach.outputs(),
            None => state.outputs.clone(),
        }
    }

    /// The value dependents receive: nothing for zero outputs, the output
    /// itself for one, a list for several. A foreach recipe yields a list or
    /// map shaped like its mapped input.
    pub fn output_value(&self) -> Result<Value> {
        let state = self.state();
        if let Some(foreach) = &state.foreach {
            return foreach.assemble();
        }
        let values = state
            .outputs
            .iter()
            .map(|output| output.value().cloned())
            .collect::<simmer_cache::Result<Vec<_>>>()?;
        Ok(collapse_values(values))
    }

    /// Status of this recipe alone, given whether all its ingredients are `Ok`.
    pub(crate) fn status_given(&self, ingredients_ok: bool) -> Status {
        if let Some(check) = &self.inner.is_clean {
            if !check(&self.outputs()) {
                return Status::CustomDirty;
            }
        }

        let current_inputs: Vec<Option<Fingerprint>> = self
            .inner
            .ingredients
            .iter()
            .map(Self::output_fingerprint)
            .collect();

        let state = self.state();
        if state.output_fingerprint.is_none() {
            return Status::NotEvaluatedYet;
        }
        if self.inner.transient {
            return Status::NotEvaluatedYet;
        }
        if !ingredients_ok {
            return Status::IngredientDirty;
        }

        if state.input_fingerprints.len() != current_inputs.len() {
            return Status::InputsChanged;
        }
        let mismatched: Vec<usize> = state
            .input_fingerprints
            .iter()
            .zip(&current_inputs)
            .enumerate()
            .filter(|(_, (stored, current))| current.as_ref() != Some(*stored))
            .map(|(i, _)| i)
            .collect();
        if !mismatched.is_empty() {
            if self.inner.foreach && mismatched == [0] {
                return Status::MappedInputsDirty;
            }
            return Status::InputsChanged;
        }

        if state
            .function_fingerprint
            .as_ref()
            .is_some_and(|previous| *previous != self.inner.function_fingerprint)
        {
            return Status::BoundFunctionChanged;
        }

        let valid = match &state.foreach {
            Some(foreach) => foreach.outputs_valid(),
            None => state.outputs.iter().all(Output::valid),
        };
        if !valid {
            return Status::OutputsInvalid;
        }

        Status::Ok
    }

    /// Status of this recipe, evaluating its whole dependency graph.
    pub fn status(&self) -> Result<Status> {
        let graph = crate::graph::RecipeGraph::build(self)?;
        let statuses = crate::status::evaluate(&graph);
        statuses
            .get(self.name())
            .copied()
            .ok_or_else(|| Error::unknown_recipe(self.name()))
    }

    /// Run the bound function on `inputs` and store the result.
    ///
    /// `input_fingerprints` are the fingerprints of the ingredients' values,
    /// in ingredient order. A foreach recipe runs its elements one by one,
    /// persisting after each.
    pub fn invoke(&self, inputs: Vec<Value>, input_fingerprints: Vec<Fingerprint>) -> Result<Vec<Output>> {
        if self.inner.foreach {
            let mut inputs = inputs.into_iter();
            let mapped = inputs.next().unwrap_or_default();
            let plan = self.plan_foreach(&mapped, inputs.collect(), input_fingerprints)?;
            for job in plan.jobs {
                match self.inner.function.call(job.inputs) {
                    Ok(results) => self.complete_element(job.index, job.input_fingerprint, results)?,
                    Err(source) => {
                        self.abandon_foreach();
                        return Err(Error::recipe(self.name(), source));
                    }
                }
            }
            self.finish_foreach(plan.input_fingerprints)?;
            return Ok(self.outputs());
        }

        let results = self
            .inner
            .function
            .call(inputs)
            .map_err(|source| Error::recipe(self.name(), source))?;
        self.commit(results, input_fingerprints)
    }

    /// Store the results of a plain recipe run and persist them.
    pub(crate) fn commit(&self, results: Vec<Value>, input_fingerprints: Vec<Fingerprint>) -> Result<Vec<Output>> {
        let fingerprinter = self.fingerprinter();
        let mut outputs = results
            .into_iter()
            .map(|value| Output::materialize(value, Arc::clone(fingerprinter)))
            .collect::<simmer_cache::Result<Vec<_>>>()?;
        if let Some(dir) = self.cache_dir() {
            outputs = outputs
                .iter()
                .map(|output| cache(output, &dir))
                .collect::<simmer_cache::Result<Vec<_>>>()?;
        }

        let fingerprints: Vec<Fingerprint> = outputs.iter().map(|o| o.fingerprint().clone()).collect();
        {
            let mut state = self.state();
            state.outputs.clone_from(&outputs);
            state.output_fingerprint = Some(collapse_fingerprints(&fingerprints));
            state.input_fingerprints = input_fingerprints;
            state.function_fingerprint = Some(self.inner.function_fingerprint.clone());
            state.foreach = None;
        }
        self.persist()?;
        Ok(outputs)
    }

    /// Write the current state to the store, if this recipe persists state.
    pub(crate) fn persist(&self) -> Result<()> {
        let Some(store) = self.store() else {
            return Ok(());
        };
        let state = self.state().clone();

        let mut record = RecipeRecord::new(self.name());
        record.input_fingerprints = state.input_fingerprints;
        record.function_fingerprint = state.function_fingerprint;
        for output in &state.outputs {
            if let Some(repr) = output.representation() {
                record.outputs.push(repr.clone());
                record.output_fingerprints.push(output.fingerprint().clone());
            }
        }
        record.foreach = state.foreach.as_ref().map(ForeachState::to_record);

        store.save(self.namespace(), &record)?;
        Ok(())
    }

    /// Delete persisted state and forget everything about past runs.
    pub fn forget(&self) -> Result<()> {
        if let Some(store) = self.store() {
            store.remove(self.namespace(), self.name())?;
        }
        *self.state() = NodeState::default();
        tracing::info!(recipe = %self.name(), "Forgot recipe state");
        Ok(())
    }

    /// Rebuild state from a persisted record.
    pub(crate) fn restore(&self, record: RecipeRecord) {
        let Some(dir) = self.cache_dir() else {
            return;
        };
        let fingerprinter = self.fingerprinter();

        let foreach = match record.foreach {
            Some(foreach) => match ForeachState::from_record(foreach, &dir, fingerprinter) {
                Ok(state) => Some(state),
                Err(e) => {
                    tracing::warn!(recipe = %self.name(), error = %e, "Ignoring unreadable foreach state");
                    return;
                }
            },
            None => None,
        };

        let outputs: Vec<Output> = record
            .outputs
            .into_iter()
            .zip(&record.output_fingerprints)
            .map(|(repr, fp)| {
                Output::from_representation(repr, fp.clone(), dir.join(fp.as_str()), Arc::clone(fingerprinter))
            })
            .collect();

        let output_fingerprint = match &foreach {
            Some(foreach) => foreach.output_fingerprint(),
            None => collapse_fingerprints(&record.output_fingerprints),
        };

        *self.state() = NodeState {
            outputs,
            output_fingerprint: Some(output_fingerprint),
            input_fingerprints: record.input_fingerprints,
            function_fingerprint: record.function_fingerprint,
            foreach,
        };
        tracing::debug!(recipe = %self.name(), "Restored recipe state");
    }
}

impl NodeData for Recipe {
    fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.inner.ingredients.iter().map(Self::name)
    }
}

impl PartialEq for Recipe {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Recipe {}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipe")
            .field("name", &self.inner.name)
            .field("namespace", &self.inner.namespace)
            .field(
                "ingredients",
                &self.inner.ingredients.iter().map(Self::name).collect::<Vec<_>>(),
            )
            .field("foreach", &self.inner.foreach)
            .field("transient", &self.inner.transient)
            .finish_non_exhaustive()
    }
}

/// The value dependents receive from a tuple of outputs.
pub(crate) fn collapse_values(mut values: Vec<Value>) -> Value {
    match values.len() {
        0 => Value::None,
        1 => values.pop().unwrap_or_default(),
        _ => Value::List(values),
    }
}

/// Fingerprint matching [`collapse_values`].
pub(crate) fn collapse_fingerprints(fingerprints: &[Fingerprint]) -> Fingerprint {
    match fingerprints {
        [] => Fingerprint::none(),
        [single] => single.clone(),
        many => Fingerprinter::combine(many),
    }
}

/// Builder returned by [`Engine::recipe`] and [`Engine::foreach`].
#[must_use = "call build() to register the recipe"]
pub struct RecipeBuilder<'e> {
    engine: &'e Engine,
    name: String,
    function: Function,
    ingredients: Vec<Recipe>,
    foreach: bool,
    transient: bool,
    cache: bool,
    is_clean: Option<Arc<CleanCheck>>,
    namespace: Option<String>,
}

impl<'e> RecipeBuilder<'e> {
    pub(crate) fn new(engine: &'e Engine, name: String, function: Function) -> Self {
        Self {
            engine,
            name,
            function,
            ingredients: Vec::new(),
            foreach: false,
            transient: false,
            cache: true,
            is_clean: None,
            namespace: None,
        }
    }

    pub(crate) fn mapping(mut self, mapped: &Recipe) -> Self {
        self.foreach = true;
        self.ingredients.insert(0, mapped.clone());
        self
    }

    /// Add one ingredient. Its value becomes the next positional input.
    pub fn ingredient(mut self, recipe: &Recipe) -> Self {
        self.ingredients.push(recipe.clone());
        self
    }

    /// Add several ingredients in order.
    pub fn ingredients<'r>(mut self, recipes: impl IntoIterator<Item = &'r Recipe>) -> Self {
        self.ingredients.extend(recipes.into_iter().cloned());
        self
    }

    /// Always re-run this recipe.
    pub fn transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    /// Persist this recipe's state (on by default, subject to the engine config).
    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Extra cleanliness rule checked before any fingerprint comparison.
    pub fn is_clean(mut self, check: impl Fn(&[Output]) -> bool + Send + Sync + 'static) -> Self {
        self.is_clean = Some(Arc::new(check));
        self
    }

    /// Namespace segment of the cache path, defaulting to the engine's.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Register the recipe, restoring any persisted state.
    pub fn build(self) -> Result<Recipe> {
        let ctx = self.engine.context();
        let function_fingerprint = ctx.fingerprinter.fingerprint_function(&self.function)?;
        let recipe = Recipe {
            inner: Arc::new(Node {
                namespace: self
                    .namespace
                    .unwrap_or_else(|| ctx.config.default_namespace.clone()),
                name: self.name,
                function: self.function,
                function_fingerprint,
                ingredients: self.ingredients,
                foreach: self.foreach,
                transient: self.transient,
                cache: self.cache,
                is_clean: self.is_clean,
                ctx: Arc::clone(ctx),
                state: Mutex::new(NodeState::default()),
            }),
        };

        self.engine.register(&recipe)?;

        if let Some(store) = recipe.store() {
            if let Some(record) = store.load(recipe.namespace(), recipe.name()) {
                recipe.restore(record);
            }
        }
        tracing::debug!(
            recipe = %recipe.name(),
            ingredients = recipe.ingredients().len(),
            foreach = recipe.is_foreach(),
            "Registered recipe"
        );
        Ok(recipe)
    }
}
