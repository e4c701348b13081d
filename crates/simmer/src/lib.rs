//! Incremental computation engine.
//!
//! A [`Recipe`] binds a [`Function`] to named ingredients. Recipes form a
//! directed acyclic graph, and brewing a target evaluates only what changed
//! since the last run: each recipe records the fingerprints of its inputs,
//! its outputs and its function, and is skipped while all of them still
//! match. Foreach recipes map a function over a list or map and remember
//! every element separately, so an interrupted run resumes where it stopped.
//!
//! ```rust,ignore
//! use simmer::{Config, Engine, Function, Value};
//!
//! let engine = Engine::new(Config::from_env()?)?;
//! let words = engine
//!     .recipe("words", Function::new("words", |_| Ok(Value::list(["a", "b"]))))
//!     .build()?;
//! let upper = engine
//!     .foreach("upper", &words, Function::new("upper", |args| {
//!         Ok(Value::from(args.get(0)?.as_str().unwrap_or_default().to_uppercase()))
//!     }))
//!     .build()?;
//! assert_eq!(engine.brew(&upper, 0).await?, Value::list(["A", "B"]));
//! ```

#![expect(
    clippy::missing_errors_doc,
    reason = "Error documentation to be added incrementally"
)]

mod engine;
mod error;
mod foreach;
mod graph;
mod progress;
mod recipe;
mod scheduler;
mod status;
pub mod tracing;

pub use engine::Engine;
pub use error::{Error, Result};
pub use graph::RecipeGraph;
pub use progress::ProgressHook;
pub use recipe::{CleanCheck, Recipe, RecipeBuilder};
pub use status::Status;

pub use simmer_cache::Output;
pub use simmer_core::{
    Args, BoxError, Config, CustomValue, ExtensionHandler, ExtensionRegistry, FileChecksum,
    Fingerprint, Fingerprinter, Function, OpaqueBlob, Value,
};
