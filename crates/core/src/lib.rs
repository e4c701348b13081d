//! Core types for simmer: the value model, bound functions, structural
//! fingerprinting and engine configuration.
//!
//! # Fingerprints
//!
//! [`Fingerprinter::fingerprint`] hashes a [`Value`] into a stable
//! [`Fingerprint`]. Equal values always hash equal. Paths hash what they
//! point at under the configured [`FileChecksum`] policy, and functions hash
//! their declared identity (version, defaults, captures), never their name.

#![expect(
    clippy::missing_errors_doc,
    reason = "Error documentation to be added incrementally"
)]

pub mod config;
mod error;
pub mod extension;
pub mod fingerprint;
pub mod function;
pub mod value;

pub use config::Config;
pub use error::{Error, Result, UnsupportedReason};
pub use extension::{ExtensionHandler, ExtensionRegistry};
pub use fingerprint::{FileChecksum, Fingerprint, Fingerprinter};
pub use function::{Args, BoxError, Function};
pub use value::{CustomValue, OpaqueBlob, Value};

impl Fingerprinter {
    /// Build a fingerprinter matching `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.file_checksum).with_fallback(config.allow_fallback_serialization)
    }
}
