//! Dependency-driven execution of a brew.
//!
//! A single coordinator owns all recipe state. It hands ready function calls
//! (whole recipes, or single foreach elements) to a bounded pool of blocking
//! workers and commits each result as it arrives. With one worker the calls
//! run inline on the coordinator in sequential visit order.

use crate::error::{Error, Result};
use crate::graph::RecipeGraph;
use crate::progress::Progress;
use crate::recipe::Recipe;
use crate::status::{self, Status};
use simmer_core::{BoxError, Fingerprint, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, warn};

type Outcome = std::result::Result<Vec<Value>, BoxError>;

/// Identifies a dispatched call: a whole recipe, or one foreach element.
struct JobKey {
    recipe: Recipe,
    element: Option<(usize, Fingerprint)>,
}

struct Job {
    key: JobKey,
    inputs: Vec<Value>,
}

impl Job {
    fn execute(self) -> (JobKey, Outcome) {
        let span = tracing::debug_span!("recipe", name = %self.key.recipe.name());
        let _enter = span.enter();
        let outcome = self.key.recipe.function().call(self.inputs);
        (self.key, outcome)
    }
}

/// Bookkeeping for a recipe that has started but not finished.
struct Running {
    started: Instant,
    input_fingerprints: Vec<Fingerprint>,
    done: usize,
    total: usize,
}

struct Scheduler<'a> {
    progress: &'a Progress,
    workers: usize,
    dirty: HashSet<String>,
    /// Dirty recipes not started yet, in visit order.
    pending: Vec<Recipe>,
    queue: VecDeque<Job>,
    running: HashMap<String, (Recipe, Running)>,
    values: HashMap<String, Value>,
    join_set: JoinSet<(JobKey, Outcome)>,
}

/// Bring `target` up to date and return its value.
pub(crate) async fn run(
    graph: &RecipeGraph,
    target: &Recipe,
    workers: usize,
    progress: &Progress,
) -> Result<Value> {
    let statuses = status::evaluate(graph);
    let dirty = needed(target, &statuses);
    let pending: Vec<Recipe> = graph
        .visit_order()?
        .into_iter()
        .filter(|recipe| dirty.contains(recipe.name()))
        .collect();
    debug!(
        target = %target.name(),
        dirty = pending.len(),
        workers,
        "Scheduling brew"
    );

    let mut scheduler = Scheduler {
        progress,
        workers: workers.max(1),
        dirty,
        pending,
        queue: VecDeque::new(),
        running: HashMap::new(),
        values: HashMap::new(),
        join_set: JoinSet::new(),
    };

    if let Err(e) = scheduler.drive().await {
        scheduler.wind_down().await;
        return Err(e);
    }
    scheduler.value_of(target)
}

/// Dirty recipes the target needs. Clean recipes stop the walk, since their
/// ingredients are clean too.
fn needed(target: &Recipe, statuses: &HashMap<String, Status>) -> HashSet<String> {
    let mut dirty = HashSet::new();
    let mut seen = HashSet::new();
    let mut stack = vec![target.clone()];
    while let Some(recipe) = stack.pop() {
        if !seen.insert(recipe.name().to_string()) {
            continue;
        }
        let status = statuses.get(recipe.name()).copied().unwrap_or(Status::NotEvaluatedYet);
        if status.is_ok() {
            continue;
        }
        debug!(recipe = %recipe.name(), status = %status, "Recipe needs evaluation");
        dirty.insert(recipe.name().to_string());
        stack.extend(recipe.ingredients().iter().cloned());
    }
    dirty
}

impl Scheduler<'_> {
    async fn drive(&mut self) -> Result<()> {
        loop {
            self.start_ready()?;

            if self.join_set.len() < self.workers {
                if let Some(job) = self.queue.pop_front() {
                    if self.workers == 1 {
                        let (key, outcome) = job.execute();
                        self.finish_job(key, outcome)?;
                    } else {
                        self.join_set.spawn_blocking(move || job.execute());
                    }
                    continue;
                }
            }

            match self.join_set.join_next().await {
                Some(Ok((key, outcome))) => self.finish_job(key, outcome)?,
                Some(Err(e)) => return Err(Error::join(e.to_string())),
                None if self.pending.is_empty() => return Ok(()),
                None => {
                    let stuck: Vec<&str> = self.pending.iter().map(Recipe::name).collect();
                    return Err(Error::join(format!(
                        "recipes could not be scheduled: {}",
                        stuck.join(", ")
                    )));
                }
            }
        }
    }

    /// Start every pending recipe whose ingredients all have values.
    fn start_ready(&mut self) -> Result<()> {
        let mut i = 0;
        while i < self.pending.len() {
            let ready = self.pending[i].ingredients().iter().all(|dep| {
                !self.dirty.contains(dep.name()) || self.values.contains_key(dep.name())
            });
            if ready {
                let recipe = self.pending.remove(i);
                self.start(recipe)?;
            } else {
                i += 1;
            }
        }
        Ok(())
    }

    fn start(&mut self, recipe: Recipe) -> Result<()> {
        let mut inputs = Vec::with_capacity(recipe.ingredients().len());
        let mut input_fingerprints = Vec::with_capacity(recipe.ingredients().len());
        for dep in recipe.ingredients() {
            inputs.push(self.value_of(dep)?);
            input_fingerprints.push(dep.output_fingerprint().unwrap_or_else(Fingerprint::none));
        }
        let started = Instant::now();

        if !recipe.is_foreach() {
            self.progress.start(recipe.name(), None);
            self.running.insert(
                recipe.name().to_string(),
                (
                    recipe.clone(),
                    Running {
                        started,
                        input_fingerprints,
                        done: 0,
                        total: 1,
                    },
                ),
            );
            self.queue.push_back(Job {
                key: JobKey {
                    recipe,
                    element: None,
                },
                inputs,
            });
            return Ok(());
        }

        let mapped = if inputs.is_empty() {
            Value::None
        } else {
            inputs.remove(0)
        };
        let plan = recipe.plan_foreach(&mapped, inputs, input_fingerprints)?;
        self.progress.start(recipe.name(), Some(plan.total));
        let done = plan.total - plan.jobs.len();
        self.running.insert(
            recipe.name().to_string(),
            (
                recipe.clone(),
                Running {
                    started,
                    input_fingerprints: plan.input_fingerprints,
                    done,
                    total: plan.total,
                },
            ),
        );

        if plan.jobs.is_empty() {
            return self.finish_foreach(&recipe);
        }
        for job in plan.jobs {
            self.queue.push_back(Job {
                key: JobKey {
                    recipe: recipe.clone(),
                    element: Some((job.index, job.input_fingerprint)),
                },
                inputs: job.inputs,
            });
        }
        Ok(())
    }

    fn finish_job(&mut self, key: JobKey, outcome: Outcome) -> Result<()> {
        let recipe = key.recipe;
        let results = match outcome {
            Ok(results) => results,
            Err(source) => {
                warn!(recipe = %recipe.name(), error = %source, "Recipe failed");
                if let Some((_, running)) = self.running.get(recipe.name()) {
                    self.progress
                        .done(recipe.name(), false, elapsed_ms(running.started));
                }
                return Err(Error::recipe(recipe.name(), source));
            }
        };

        match key.element {
            None => {
                let input_fingerprints = self
                    .running
                    .get_mut(recipe.name())
                    .map(|(_, running)| std::mem::take(&mut running.input_fingerprints))
                    .unwrap_or_default();
                recipe.commit(results, input_fingerprints)?;
                self.complete(&recipe)
            }
            Some((index, input_fingerprint)) => {
                recipe.complete_element(index, input_fingerprint, results)?;
                let Some((_, running)) = self.running.get_mut(recipe.name()) else {
                    return Ok(());
                };
                running.done += 1;
                let (done, total) = (running.done, running.total);
                self.progress.progress(recipe.name(), done, total);
                if done == total {
                    self.finish_foreach(&recipe)?;
                }
                Ok(())
            }
        }
    }

    fn finish_foreach(&mut self, recipe: &Recipe) -> Result<()> {
        let input_fingerprints = self
            .running
            .get_mut(recipe.name())
            .map(|(_, running)| std::mem::take(&mut running.input_fingerprints))
            .unwrap_or_default();
        recipe.finish_foreach(input_fingerprints)?;
        self.complete(recipe)
    }

    fn complete(&mut self, recipe: &Recipe) -> Result<()> {
        let value = recipe.output_value()?;
        self.values.insert(recipe.name().to_string(), value);
        if let Some((_, running)) = self.running.remove(recipe.name()) {
            self.progress
                .done(recipe.name(), true, elapsed_ms(running.started));
        }
        Ok(())
    }

    /// The value of an ingredient. Clean recipes are loaded on first use.
    fn value_of(&mut self, recipe: &Recipe) -> Result<Value> {
        if let Some(value) = self.values.get(recipe.name()) {
            return Ok(value.clone());
        }
        let value = recipe.output_value()?;
        self.progress.cached(recipe.name());
        self.values.insert(recipe.name().to_string(), value.clone());
        Ok(value)
    }

    /// Stop dispatching and wait for calls already in flight. Their results
    /// are recorded like any other, so finished elements stay persisted.
    async fn wind_down(&mut self) {
        self.queue.clear();
        self.pending.clear();
        while let Some(joined) = self.join_set.join_next().await {
            let result = match joined {
                Ok((key, outcome)) => self.finish_job(key, outcome),
                Err(e) => Err(Error::join(e.to_string())),
            };
            if let Err(e) = result {
                warn!(error = %e, "Further failure while stopping brew");
            }
        }
        for (recipe, _) in self.running.values() {
            if recipe.is_foreach() {
                recipe.abandon_foreach();
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
