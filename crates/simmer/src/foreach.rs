//! Per-element evaluation of foreach recipes.
//!
//! A foreach recipe runs its function once per element of its mapped input
//! and remembers each element's result, so a later run only recomputes the
//! elements that changed or never completed.

use crate::error::{Error, Result};
use crate::recipe::{Recipe, collapse_values};
use simmer_cache::{
    ElementOutput, ElementRecord, ForeachRecord, Output, Representation, Shape, cache, deserialize,
    serialize,
};
use simmer_core::{Fingerprint, Fingerprinter, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Stored in place of the mapped input fingerprint while elements are missing.
pub(crate) const INCOMPLETE: &str = "incomplete";

#[derive(Clone)]
pub(crate) struct ForeachState {
    pub(crate) shape: Shape,
    pub(crate) mapped_fingerprint: Fingerprint,
    pub(crate) elements: Vec<Element>,
}

#[derive(Clone)]
pub(crate) struct Element {
    key: Option<Key>,
    done: Option<Done>,
}

#[derive(Clone)]
struct Key {
    value: Value,
    fingerprint: Fingerprint,
    representation: Option<Representation>,
}

#[derive(Clone)]
struct Done {
    input_fingerprint: Fingerprint,
    output: Output,
}

/// One element that still has to run.
pub(crate) struct ElementJob {
    pub(crate) index: usize,
    pub(crate) input_fingerprint: Fingerprint,
    /// The element value followed by the recipe's other inputs.
    pub(crate) inputs: Vec<Value>,
}

/// Work left for one foreach evaluation.
pub(crate) struct ForeachPlan {
    pub(crate) jobs: Vec<ElementJob>,
    pub(crate) total: usize,
    /// Fingerprints to record once every element has completed.
    pub(crate) input_fingerprints: Vec<Fingerprint>,
}

impl ForeachState {
    pub(crate) fn outputs(&self) -> Vec<Output> {
        self.elements
            .iter()
            .filter_map(|e| e.done.as_ref().map(|d| d.output.clone()))
            .collect()
    }

    pub(crate) fn outputs_valid(&self) -> bool {
        self.elements
            .iter()
            .filter_map(|e| e.done.as_ref())
            .all(|d| d.output.valid())
    }

    fn is_complete(&self) -> bool {
        self.elements.iter().all(|e| e.done.is_some())
    }

    /// Fingerprint of the assembled collection. Missing elements count as `None`.
    pub(crate) fn output_fingerprint(&self) -> Fingerprint {
        let none = Fingerprint::none();
        let tag = Fingerprint::from(match self.shape {
            Shape::List => "list",
            Shape::Map => "map",
        });
        let mut parts = vec![&tag];
        for element in &self.elements {
            if let Some(key) = &element.key {
                parts.push(&key.fingerprint);
            }
            parts.push(element.done.as_ref().map_or(&none, |d| d.output.fingerprint()));
        }
        Fingerprinter::combine(parts)
    }

    /// The collection dependents receive, shaped like the mapped input.
    pub(crate) fn assemble(&self) -> Result<Value> {
        let value_of = |element: &Element| -> Result<Value> {
            match &element.done {
                Some(done) => Ok(done.output.value()?.clone()),
                None => Ok(Value::None),
            }
        };
        match self.shape {
            Shape::List => Ok(Value::List(
                self.elements.iter().map(value_of).collect::<Result<_>>()?,
            )),
            Shape::Map => Ok(Value::Map(
                self.elements
                    .iter()
                    .map(|e| {
                        let key = e.key.as_ref().map_or(Value::None, |k| k.value.clone());
                        Ok((key, value_of(e)?))
                    })
                    .collect::<Result<_>>()?,
            )),
        }
    }

    pub(crate) fn to_record(&self) -> ForeachRecord {
        ForeachRecord {
            shape: self.shape,
            mapped_fingerprint: self.mapped_fingerprint.clone(),
            elements: self
                .elements
                .iter()
                .map(|e| ElementRecord {
                    key: e.key.as_ref().and_then(|k| k.representation.clone()),
                    key_fingerprint: e.key.as_ref().map(|k| k.fingerprint.clone()),
                    output: e.done.as_ref().and_then(|d| {
                        d.output.representation().map(|repr| ElementOutput {
                            input_fingerprint: d.input_fingerprint.clone(),
                            output: repr.clone(),
                            output_fingerprint: d.output.fingerprint().clone(),
                        })
                    }),
                })
                .collect(),
        }
    }

    pub(crate) fn from_record(
        record: ForeachRecord,
        dir: &Path,
        fingerprinter: &Arc<Fingerprinter>,
    ) -> Result<Self> {
        let mut elements = Vec::with_capacity(record.elements.len());
        for element in record.elements {
            let key = match (element.key, element.key_fingerprint) {
                (Some(repr), Some(fingerprint)) => Some(Key {
                    value: deserialize(&repr, &dir.join(fingerprint.as_str()), fingerprinter)?,
                    fingerprint,
                    representation: Some(repr),
                }),
                _ => None,
            };
            let done = element.output.map(|out| Done {
                output: Output::from_representation(
                    out.output,
                    out.output_fingerprint.clone(),
                    dir.join(out.output_fingerprint.as_str()),
                    Arc::clone(fingerprinter),
                ),
                input_fingerprint: out.input_fingerprint,
            });
            elements.push(Element { key, done });
        }
        Ok(Self {
            shape: record.shape,
            mapped_fingerprint: record.mapped_fingerprint,
            elements,
        })
    }
}

impl Recipe {
    /// Match the mapped input against the last run and install the new
    /// element layout. Returns the elements that still need to run.
    ///
    /// A full reevaluation happens for transient recipes, when the container
    /// shape or the bound function changed, or when any other input changed.
    pub(crate) fn plan_foreach(
        &self,
        mapped: &Value,
        other_inputs: Vec<Value>,
        input_fingerprints: Vec<Fingerprint>,
    ) -> Result<ForeachPlan> {
        let shape = match mapped {
            Value::List(_) => Shape::List,
            Value::Map(_) => Shape::Map,
            other => {
                return Err(simmer_core::Error::shape_mismatch(self.name(), other.kind()).into());
            }
        };
        let fingerprinter = Arc::clone(self.fingerprinter());
        let dir = self.cache_dir();

        let mut state = self.state();
        let previous = state.foreach.take();
        let full = self.inner.transient
            || previous.as_ref().map(|p| p.shape) != Some(shape)
            || state.function_fingerprint.as_ref() != Some(&self.inner.function_fingerprint)
            || state.input_fingerprints.get(1..) != input_fingerprints.get(1..);

        if !full
            && state.input_fingerprints == input_fingerprints
            && previous.as_ref().is_some_and(|p| p.is_complete() && p.outputs_valid())
        {
            let total = previous.as_ref().map_or(0, |p| p.elements.len());
            state.foreach = previous;
            tracing::debug!(recipe = %self.name(), "Mapped input unchanged");
            return Ok(ForeachPlan {
                jobs: Vec::new(),
                total,
                input_fingerprints,
            });
        }

        // Completed elements of the last run that can be reused, keyed by
        // input fingerprint (lists) or key fingerprint (maps).
        let mut reusable: HashMap<Fingerprint, Vec<Done>> = HashMap::new();
        if !full {
            for element in previous.into_iter().flat_map(|p| p.elements) {
                let Some(done) = element.done.filter(|d| d.output.valid()) else {
                    continue;
                };
                let lookup = match element.key {
                    Some(key) => key.fingerprint,
                    None => done.input_fingerprint.clone(),
                };
                reusable.entry(lookup).or_default().push(done);
            }
        }

        let entries: Vec<(Option<&Value>, &Value)> = match mapped {
            Value::List(items) => items.iter().map(|item| (None, item)).collect(),
            Value::Map(entries) => entries.iter().map(|(k, v)| (Some(k), v)).collect(),
            _ => Vec::new(),
        };

        let mut elements = Vec::with_capacity(entries.len());
        let mut jobs = Vec::new();
        for (index, (key, item)) in entries.into_iter().enumerate() {
            let input_fingerprint = fingerprinter.fingerprint(item)?;
            let key = match key {
                Some(key) => {
                    let fingerprint = fingerprinter.fingerprint(key)?;
                    let representation = match &dir {
                        Some(dir) => Some(serialize(
                            key,
                            &dir.join(fingerprint.as_str()),
                            &fingerprinter,
                        )?),
                        None => None,
                    };
                    Some(Key {
                        value: key.clone(),
                        fingerprint,
                        representation,
                    })
                }
                None => None,
            };

            let lookup = key.as_ref().map_or(&input_fingerprint, |k| &k.fingerprint);
            let done = reusable.get_mut(lookup).and_then(|candidates| {
                let position = candidates
                    .iter()
                    .position(|d| d.input_fingerprint == input_fingerprint)?;
                Some(candidates.swap_remove(position))
            });

            if done.is_none() {
                let mut inputs = Vec::with_capacity(other_inputs.len() + 1);
                inputs.push(item.clone());
                inputs.extend(other_inputs.iter().cloned());
                jobs.push(ElementJob {
                    index,
                    input_fingerprint,
                    inputs,
                });
            }
            elements.push(Element { key, done });
        }

        let foreach = ForeachState {
            shape,
            mapped_fingerprint: Fingerprint::from(INCOMPLETE),
            elements,
        };
        state.output_fingerprint = Some(foreach.output_fingerprint());
        state.input_fingerprints.clone_from(&input_fingerprints);
        if let Some(slot) = state.input_fingerprints.first_mut() {
            *slot = Fingerprint::from(INCOMPLETE);
        }
        state.function_fingerprint = Some(self.inner.function_fingerprint.clone());
        state.outputs.clear();
        let total = foreach.elements.len();
        state.foreach = Some(foreach);
        drop(state);

        tracing::debug!(
            recipe = %self.name(),
            total,
            pending = jobs.len(),
            full,
            "Planned foreach evaluation"
        );
        Ok(ForeachPlan {
            jobs,
            total,
            input_fingerprints,
        })
    }

    /// Record one element's result and persist the partial state.
    pub(crate) fn complete_element(
        &self,
        index: usize,
        input_fingerprint: Fingerprint,
        results: Vec<Value>,
    ) -> Result<()> {
        let output = Output::materialize(collapse_values(results), Arc::clone(self.fingerprinter()))?;
        let output = match self.cache_dir() {
            Some(dir) => cache(&output, &dir)?,
            None => output,
        };

        {
            let mut state = self.state();
            let foreach = state
                .foreach
                .as_mut()
                .ok_or_else(|| Error::join(format!("recipe '{}' has no foreach run in progress", self.name())))?;
            let element = foreach
                .elements
                .get_mut(index)
                .ok_or_else(|| Error::join(format!("recipe '{}' has no element {index}", self.name())))?;
            element.done = Some(Done {
                input_fingerprint,
                output,
            });
            let fingerprint = foreach.output_fingerprint();
            state.output_fingerprint = Some(fingerprint);
        }
        self.persist()
    }

    /// Mark the run complete once every element has a result.
    pub(crate) fn finish_foreach(&self, input_fingerprints: Vec<Fingerprint>) -> Result<()> {
        {
            let mut state = self.state();
            let Some(foreach) = state.foreach.as_mut() else {
                return Ok(());
            };
            if !foreach.is_complete() {
                return Ok(());
            }
            foreach.mapped_fingerprint = input_fingerprints
                .first()
                .cloned()
                .unwrap_or_else(Fingerprint::none);
            state.input_fingerprints = input_fingerprints;
        }
        self.persist()
    }

    /// Persist the partial state of an interrupted run. Failures here are
    /// logged; the run's own error takes precedence.
    pub(crate) fn abandon_foreach(&self) {
        if let Err(e) = self.persist() {
            tracing::warn!(recipe = %self.name(), error = %e, "Failed to persist partial foreach state");
        }
    }
}
