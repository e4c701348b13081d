//! Structured event system for simmer.
//!
//! Engine lifecycle is emitted through `tracing` using the `emit_*!` macros
//! below, always on a `simmer::*` target with an `event_type` field. The
//! [`SimmerEventLayer`] picks those events up and turns them into typed
//! [`SimmerEvent`]s sent over an unbounded channel, so progress frontends
//! never parse log text.
//!
//! # Usage
//!
//! ```rust,ignore
//! use simmer_events::{SimmerEventLayer, emit_recipe_started};
//! use tokio::sync::mpsc;
//! use tracing_subscriber::layer::SubscriberExt;
//! use tracing_subscriber::util::SubscriberInitExt;
//!
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! tracing_subscriber::registry().with(SimmerEventLayer::new(tx)).init();
//!
//! emit_recipe_started!("load");
//! let event = rx.recv().await;
//! ```

pub mod event;
pub mod layer;
pub mod metadata;

pub use event::{BrewEvent, EventCategory, EventSource, RecipeEvent, SimmerEvent};
pub use layer::SimmerEventLayer;
pub use metadata::{correlation_id, set_correlation_id};

// ============================================================================
// Emit Macros
// ============================================================================

/// Emit a recipe started event, optionally with the number of elements to run.
///
/// # Example
/// ```rust,ignore
/// emit_recipe_started!("load");
/// emit_recipe_started!("split", 12_usize);
/// ```
#[macro_export]
macro_rules! emit_recipe_started {
    ($name:expr) => {
        ::tracing::info!(
            target: "simmer::recipe",
            event_type = "recipe.started",
            recipe_name = %$name,
        )
    };
    ($name:expr, $total:expr) => {
        ::tracing::info!(
            target: "simmer::recipe",
            event_type = "recipe.started",
            recipe_name = %$name,
            total = $total,
        )
    };
}

/// Emit a foreach progress event.
#[macro_export]
macro_rules! emit_recipe_progress {
    ($name:expr, $completed:expr, $total:expr) => {
        ::tracing::debug!(
            target: "simmer::recipe",
            event_type = "recipe.progress",
            recipe_name = %$name,
            completed = $completed,
            total = $total,
        )
    };
}

/// Emit a recipe cache hit event.
#[macro_export]
macro_rules! emit_recipe_cached {
    ($name:expr) => {
        ::tracing::debug!(
            target: "simmer::recipe",
            event_type = "recipe.cached",
            recipe_name = %$name,
        )
    };
}

/// Emit a recipe completed event.
///
/// # Example
/// ```rust,ignore
/// emit_recipe_completed!("load", true, 42_u64);
/// ```
#[macro_export]
macro_rules! emit_recipe_completed {
    ($name:expr, $success:expr, $duration_ms:expr) => {
        ::tracing::info!(
            target: "simmer::recipe",
            event_type = "recipe.completed",
            recipe_name = %$name,
            success = $success,
            duration_ms = $duration_ms,
        )
    };
}

/// Emit a brew started event.
#[macro_export]
macro_rules! emit_brew_started {
    ($target:expr, $recipe_count:expr, $workers:expr) => {
        ::tracing::info!(
            target: "simmer::brew",
            event_type = "brew.started",
            brew_target = %$target,
            recipe_count = $recipe_count,
            workers = $workers,
        )
    };
}

/// Emit a brew completed event.
#[macro_export]
macro_rules! emit_brew_completed {
    ($target:expr, $success:expr, $duration_ms:expr) => {
        ::tracing::info!(
            target: "simmer::brew",
            event_type = "brew.completed",
            brew_target = %$target,
            success = $success,
            duration_ms = $duration_ms,
        )
    };
}
