//! Event type definitions for structured simmer events.
//!
//! Events are grouped by domain: per-recipe lifecycle events and whole-brew
//! events. Every event carries the session correlation id and its source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A structured simmer event with full metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimmerEvent {
    /// Unique event identifier.
    pub id: Uuid,
    /// Correlation ID for tracing all events of one session together.
    pub correlation_id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Source information for the event.
    pub source: EventSource,
    /// The event category and data.
    pub category: EventCategory,
}

impl SimmerEvent {
    /// Create a new event with the given category.
    #[must_use]
    pub fn new(correlation_id: Uuid, source: EventSource, category: EventCategory) -> Self {
        Self {
            id: Uuid::new_v4(),
            correlation_id,
            timestamp: Utc::now(),
            source,
            category,
        }
    }

    /// Name of the recipe this event is about, if it is a recipe event.
    #[must_use]
    pub fn recipe_name(&self) -> Option<&str> {
        match &self.category {
            EventCategory::Recipe(
                RecipeEvent::Started { name, .. }
                | RecipeEvent::Progress { name, .. }
                | RecipeEvent::Cached { name }
                | RecipeEvent::Completed { name, .. },
            ) => Some(name),
            EventCategory::Brew(_) => None,
        }
    }
}

/// Source information for an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSource {
    /// The tracing target (e.g., "`simmer::recipe`").
    pub target: String,
    /// Source file path, if available.
    pub file: Option<String>,
    /// Source line number, if available.
    pub line: Option<u32>,
}

impl EventSource {
    /// Create a new event source with just a target.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            file: None,
            line: None,
        }
    }

    /// Create a new event source with file and line information.
    #[must_use]
    pub fn with_location(target: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            target: target.into(),
            file: Some(file.into()),
            line: Some(line),
        }
    }
}

/// Event categories organized by domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventCategory {
    /// Recipe evaluation lifecycle events.
    Recipe(RecipeEvent),
    /// Whole-graph evaluation events.
    Brew(BrewEvent),
}

/// Recipe evaluation lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RecipeEvent {
    /// Recipe body is about to run.
    Started {
        /// Recipe name.
        name: String,
        /// Number of elements to compute (foreach recipes), if known.
        total: Option<usize>,
    },
    /// A foreach recipe finished another element.
    Progress {
        /// Recipe name.
        name: String,
        /// Elements completed so far.
        completed: usize,
        /// Elements to compute in this run.
        total: usize,
    },
    /// Recipe was up to date; cached output reused.
    Cached {
        /// Recipe name.
        name: String,
    },
    /// Recipe evaluation finished.
    Completed {
        /// Recipe name.
        name: String,
        /// Whether the body succeeded.
        success: bool,
        /// Duration in milliseconds.
        duration_ms: u64,
    },
}

/// Whole-graph evaluation events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum BrewEvent {
    /// Evaluation of a target started.
    Started {
        /// Target recipe name.
        target: String,
        /// Number of recipes in the graph.
        recipe_count: usize,
        /// Effective worker count.
        workers: usize,
    },
    /// Evaluation of a target finished.
    Completed {
        /// Target recipe name.
        target: String,
        /// Whether evaluation succeeded.
        success: bool,
        /// Duration in milliseconds.
        duration_ms: u64,
    },
}
