//! Persistent recipe state for simmer
//!
//! This crate turns in-memory recipe results into durable state:
//! - [`representation`] converts values to and from a JSON representation,
//!   spilling byte blobs and custom values to content-addressed side files
//! - [`Output`] pairs a value with its fingerprint and knows whether it is
//!   still valid, either by re-fingerprinting or by checking its representation
//! - [`Store`] reads and writes one record file per recipe
//!
//! # Layout
//!
//! ```text
//! <cache root>/.simmer/<namespace>/<recipe>/record.json
//! <cache root>/.simmer/<namespace>/<recipe>/<output fingerprint>/<sha256>.bin
//! ```

#![expect(
    clippy::missing_errors_doc,
    reason = "Error documentation to be added incrementally"
)]

mod error;
pub mod output;
pub mod representation;
pub mod store;

// Re-export error types at crate root
pub use error::{Error, Result};

pub use output::{Output, cache};
pub use representation::{Representation, TOKEN_KEY, deserialize, is_valid, serialize};
pub use store::{
    ElementOutput, ElementRecord, ForeachRecord, RECORD_FILE, RECORD_VERSION, RecipeRecord, Shape,
    Store,
};
