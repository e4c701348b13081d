//! Custom tracing Layer for capturing simmer events.
//!
//! This layer intercepts tracing events with a `simmer` target and an
//! `event_type` field, converts them to `SimmerEvent` instances, and sends
//! them to an unbounded channel.

#![allow(clippy::cast_possible_truncation)]

use crate::event::{BrewEvent, EventCategory, EventSource, RecipeEvent, SimmerEvent};
use crate::metadata::correlation_id;
use tokio::sync::mpsc;
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

/// A tracing Layer that captures simmer-specific events.
pub struct SimmerEventLayer {
    sender: mpsc::UnboundedSender<SimmerEvent>,
}

impl SimmerEventLayer {
    /// Create a new layer that sends events to the given channel.
    #[must_use]
    pub fn new(sender: mpsc::UnboundedSender<SimmerEvent>) -> Self {
        Self { sender }
    }
}

impl<S> Layer<S> for SimmerEventLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let target = meta.target();

        if !target.starts_with("simmer") {
            return;
        }

        let mut visitor = SimmerEventVisitor::new(target);
        if let (Some(file), Some(line)) = (meta.file(), meta.line()) {
            visitor.location = Some((file.to_string(), line));
        }
        event.record(&mut visitor);

        if let Some(simmer_event) = visitor.build() {
            let _ = self.sender.send(simmer_event);
        }
    }
}

/// Visitor for extracting typed fields from tracing events.
#[derive(Default)]
struct SimmerEventVisitor {
    target: String,
    location: Option<(String, u32)>,
    event_type: Option<String>,
    recipe_name: Option<String>,
    brew_target: Option<String>,
    total: Option<usize>,
    completed: Option<usize>,
    success: Option<bool>,
    duration_ms: Option<u64>,
    recipe_count: Option<usize>,
    workers: Option<usize>,
}

impl SimmerEventVisitor {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            ..Self::default()
        }
    }

    fn build(self) -> Option<SimmerEvent> {
        let event_type = self.event_type.as_deref()?;
        let source = match self.location {
            Some((file, line)) => EventSource::with_location(&self.target, file, line),
            None => EventSource::new(&self.target),
        };

        let category = match event_type {
            "recipe.started" => EventCategory::Recipe(RecipeEvent::Started {
                name: self.recipe_name?,
                total: self.total,
            }),
            "recipe.progress" => EventCategory::Recipe(RecipeEvent::Progress {
                name: self.recipe_name?,
                completed: self.completed?,
                total: self.total?,
            }),
            "recipe.cached" => EventCategory::Recipe(RecipeEvent::Cached {
                name: self.recipe_name?,
            }),
            "recipe.completed" => EventCategory::Recipe(RecipeEvent::Completed {
                name: self.recipe_name?,
                success: self.success?,
                duration_ms: self.duration_ms.unwrap_or(0),
            }),
            "brew.started" => EventCategory::Brew(BrewEvent::Started {
                target: self.brew_target?,
                recipe_count: self.recipe_count.unwrap_or(0),
                workers: self.workers.unwrap_or(0),
            }),
            "brew.completed" => EventCategory::Brew(BrewEvent::Completed {
                target: self.brew_target?,
                success: self.success?,
                duration_ms: self.duration_ms.unwrap_or(0),
            }),
            _ => return None,
        };

        Some(SimmerEvent::new(correlation_id(), source, category))
    }
}

impl Visit for SimmerEventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "event_type" => self.event_type = Some(value.to_string()),
            "recipe_name" => self.recipe_name = Some(value.to_string()),
            "brew_target" => self.brew_target = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if let Ok(value) = u64::try_from(value) {
            self.record_u64(field, value);
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match field.name() {
            "total" => self.total = Some(value as usize),
            "completed" => self.completed = Some(value as usize),
            "duration_ms" => self.duration_ms = Some(value),
            "recipe_count" => self.recipe_count = Some(value as usize),
            "workers" => self.workers = Some(value as usize),
            _ => {}
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "success" {
            self.success = Some(value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // `%display` fields arrive here
        let value_str = format!("{value:?}");
        match field.name() {
            "recipe_name" => self.recipe_name = Some(value_str),
            "brew_target" => self.brew_target = Some(value_str),
            "event_type" => self.event_type = Some(value_str),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[tokio::test]
    async fn test_layer_captures_recipe_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(SimmerEventLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            crate::emit_recipe_started!("split", 4_usize);
            crate::emit_recipe_progress!("split", 1_usize, 4_usize);
            crate::emit_recipe_completed!("split", true, 12_u64);
        });

        match rx.recv().await.unwrap().category {
            EventCategory::Recipe(RecipeEvent::Started { name, total }) => {
                assert_eq!(name, "split");
                assert_eq!(total, Some(4));
            }
            other => panic!("expected started event, got {other:?}"),
        }
        match rx.recv().await.unwrap().category {
            EventCategory::Recipe(RecipeEvent::Progress {
                completed, total, ..
            }) => {
                assert_eq!((completed, total), (1, 4));
            }
            other => panic!("expected progress event, got {other:?}"),
        }
        match rx.recv().await.unwrap().category {
            EventCategory::Recipe(RecipeEvent::Completed {
                success,
                duration_ms,
                ..
            }) => {
                assert!(success);
                assert_eq!(duration_ms, 12);
            }
            other => panic!("expected completed event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_layer_ignores_foreign_targets() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(SimmerEventLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(
                target: "other::target",
                event_type = "recipe.cached",
                recipe_name = "ignored",
            );
        });

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_layer_captures_brew_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(SimmerEventLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            crate::emit_brew_started!("root", 7_usize, 2_usize);
        });

        match rx.recv().await.unwrap().category {
            EventCategory::Brew(BrewEvent::Started {
                target,
                recipe_count,
                workers,
            }) => {
                assert_eq!(target, "root");
                assert_eq!(recipe_count, 7);
                assert_eq!(workers, 2);
            }
            other => panic!("expected brew started event, got {other:?}"),
        }
    }
}
