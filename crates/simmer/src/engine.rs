//! The engine: recipe registry and brew entry points.

use crate::error::{Error, Result};
use crate::graph::RecipeGraph;
use crate::progress::{Progress, ProgressHook};
use crate::recipe::{Recipe, RecipeBuilder};
use crate::scheduler;
use crate::status::{self, Status};
use simmer_cache::Store;
use simmer_core::{Config, ExtensionRegistry, Fingerprinter, Function, Value};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::Instrument;

/// Settings and services shared by every recipe of one engine.
pub(crate) struct Context {
    pub(crate) config: Config,
    pub(crate) fingerprinter: Arc<Fingerprinter>,
    pub(crate) store: Option<Store>,
}

/// Owns a set of recipes and evaluates them on demand.
///
/// ```rust,ignore
/// let engine = Engine::new(Config::default())?;
/// let numbers = engine
///     .recipe("numbers", Function::new("numbers", |_| Ok(Value::list([1, 2, 3]))))
///     .build()?;
/// let doubled = engine
///     .foreach("doubled", &numbers, Function::new("double", |args| {
///         Ok(Value::Int(args.get(0)?.as_int().unwrap_or_default() * 2))
///     }))
///     .build()?;
/// let value = engine.brew(&doubled, 4).await?;
/// ```
pub struct Engine {
    ctx: Arc<Context>,
    recipes: Mutex<HashMap<String, Recipe>>,
    progress: Progress,
}

impl Engine {
    /// Create an engine with no extension handlers.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_extensions(config, ExtensionRegistry::new())
    }

    /// Create an engine that encodes custom values through `extensions`.
    pub fn with_extensions(config: Config, extensions: ExtensionRegistry) -> Result<Self> {
        config.validate()?;
        let fingerprinter =
            Arc::new(Fingerprinter::from_config(&config).with_extensions(Arc::new(extensions)));
        let store = if config.cache_enabled {
            Some(Store::new(config.cache_dir()?))
        } else {
            None
        };
        tracing::info!(
            cache = ?store.as_ref().map(Store::root),
            checksum = %config.file_checksum,
            fallback = config.allow_fallback_serialization,
            "Created engine"
        );
        Ok(Self {
            ctx: Arc::new(Context {
                config,
                fingerprinter,
                store,
            }),
            recipes: Mutex::new(HashMap::new()),
            progress: Progress::default(),
        })
    }

    /// Install a progress hook. Hooks are called in installation order.
    #[must_use]
    pub fn with_progress(mut self, hook: impl ProgressHook + 'static) -> Self {
        self.progress.push(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    #[must_use]
    pub fn fingerprinter(&self) -> &Fingerprinter {
        &self.ctx.fingerprinter
    }

    /// Root of the on-disk cache, if caching is enabled.
    #[must_use]
    pub fn cache_root(&self) -> Option<&std::path::Path> {
        self.ctx.store.as_ref().map(Store::root)
    }

    pub(crate) fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Start defining a recipe that calls `function` once per evaluation.
    pub fn recipe(&self, name: impl Into<String>, function: Function) -> RecipeBuilder<'_> {
        RecipeBuilder::new(self, name.into(), function)
    }

    /// Start defining a recipe that calls `function` once per element of
    /// `mapped`'s value, which must be a list or a map. The element is the
    /// first input; further ingredients follow.
    pub fn foreach(&self, name: impl Into<String>, mapped: &Recipe, function: Function) -> RecipeBuilder<'_> {
        RecipeBuilder::new(self, name.into(), function).mapping(mapped)
    }

    pub(crate) fn register(&self, recipe: &Recipe) -> Result<()> {
        let mut recipes = self.recipes.lock().unwrap_or_else(PoisonError::into_inner);
        if recipes.contains_key(recipe.name()) {
            return Err(Error::duplicate_recipe(recipe.name()));
        }
        recipes.insert(recipe.name().to_string(), recipe.clone());
        Ok(())
    }

    /// Look up a registered recipe by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Recipe> {
        self.recipes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Names of all registered recipes, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .recipes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// The dependency graph reachable from `target`.
    pub fn graph(&self, target: &Recipe) -> Result<RecipeGraph> {
        RecipeGraph::build(target)
    }

    /// Status of `target` without evaluating anything.
    pub fn status(&self, target: &Recipe) -> Result<Status> {
        target.status()
    }

    /// Status of every recipe `target` depends on, ingredients first.
    pub fn status_report(&self, target: &Recipe) -> Result<Vec<(String, Status)>> {
        let graph = RecipeGraph::build(target)?;
        let statuses = status::evaluate(&graph);
        Ok(graph
            .recipes_in_order()
            .iter()
            .map(|recipe| {
                let status = statuses
                    .get(recipe.name())
                    .copied()
                    .unwrap_or(Status::NotEvaluatedYet);
                (recipe.name().to_string(), status)
            })
            .collect())
    }

    /// Bring `target` up to date and return its value.
    ///
    /// Only recipes that are not `Ok` are evaluated. `workers` bounds how many
    /// function calls run at once; `1` runs everything on the calling task in
    /// sequential order and `0` uses the host's available parallelism.
    ///
    /// On failure nothing new is started. Calls already running are awaited
    /// and their results persisted, then the first recipe error is returned.
    pub async fn brew(&self, target: &Recipe, workers: usize) -> Result<Value> {
        let workers = resolve_workers(workers);
        let graph = RecipeGraph::build(target)?;
        let span = tracing::info_span!(
            "brew",
            target = %target.name(),
            correlation_id = %simmer_events::correlation_id(),
        );

        async {
            simmer_events::emit_brew_started!(target.name(), graph.len(), workers);
            let started = Instant::now();
            let result = scheduler::run(&graph, target, workers, &self.progress).await;
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            simmer_events::emit_brew_completed!(target.name(), result.is_ok(), duration_ms);
            result
        }
        .instrument(span)
        .await
    }

    /// [`Engine::brew`] by recipe name.
    pub async fn brew_named(&self, name: &str, workers: usize) -> Result<Value> {
        let target = self.get(name).ok_or_else(|| Error::unknown_recipe(name))?;
        self.brew(&target, workers).await
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.ctx.config)
            .field("recipes", &self.names())
            .finish_non_exhaustive()
    }
}

fn resolve_workers(workers: usize) -> usize {
    if workers > 0 {
        return workers;
    }
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine(tmp: &TempDir) -> Engine {
        Engine::new(Config::default().with_cache_root(tmp.path())).unwrap()
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp);
        engine
            .recipe("load", Function::new("load", |_| Ok(Value::Int(1))))
            .build()
            .unwrap();
        let err = engine
            .recipe("load", Function::new("other", |_| Ok(Value::Int(2))))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRecipe { ref name } if name == "load"));
    }

    #[test]
    fn test_registry_lookup() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp);
        let b = engine
            .recipe("b", Function::new("b", |_| Ok(Value::None)))
            .build()
            .unwrap();
        engine
            .recipe("a", Function::new("a", |_| Ok(Value::None)))
            .build()
            .unwrap();
        assert_eq!(engine.names(), vec!["a", "b"]);
        assert_eq!(engine.get("b"), Some(b));
        assert!(engine.get("missing").is_none());
    }

    #[test]
    fn test_worker_resolution() {
        assert_eq!(resolve_workers(3), 3);
        assert!(resolve_workers(0) >= 1);
    }

    #[test]
    fn test_disabled_cache_has_no_root() {
        let engine = Engine::new(Config::default().with_cache_enabled(false)).unwrap();
        assert!(engine.cache_root().is_none());
    }

    #[tokio::test]
    async fn test_brew_named_unknown() {
        let tmp = TempDir::new().unwrap();
        let err = engine(&tmp).brew_named("nope", 1).await.unwrap_err();
        assert!(matches!(err, Error::UnknownRecipe { .. }));
    }
}
