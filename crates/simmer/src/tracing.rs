//! Tracing bootstrap for programs embedding simmer.
//!
//! Installs a global subscriber with one of several output formats and,
//! optionally, the [`SimmerEventLayer`] so recipe lifecycle events reach an
//! event bus as typed values.

use simmer_events::{SimmerEvent, SimmerEventLayer, correlation_id};
use std::io;
use tokio::sync::mpsc;
pub use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Tracing output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Pretty-printed human-readable format
    Pretty,
    /// Compact single-line format
    Compact,
    /// Structured JSON format
    Json,
    /// Development format with file locations and thread ids
    Dev,
}

impl std::str::FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            "dev" => Ok(Self::Dev),
            _ => Err(format!("Unknown tracing format: {s}")),
        }
    }
}

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub format: TracingFormat,
    pub level: Level,
    /// Explicit filter directives; otherwise `RUST_LOG`, otherwise `level`.
    pub filter: Option<String>,
    /// Where to deliver structured recipe events, if anywhere.
    pub events: Option<mpsc::UnboundedSender<SimmerEvent>>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: TracingFormat::Compact,
            level: Level::WARN,
            filter: None,
            events: None,
        }
    }
}

fn default_directives(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    format!("simmer={level},simmer_core={level},simmer_cache={level},simmer_graph={level}")
}

/// Initialize tracing with the given configuration
pub fn init_tracing(config: TracingConfig) -> miette::Result<()> {
    let env_filter = if let Some(filter) = config.filter {
        EnvFilter::try_new(filter)
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_directives(config.level)))
    }
    .map_err(|e| miette::miette!("Failed to create tracing filter: {e}"))?;

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(config.events.map(SimmerEventLayer::new));

    let initialized = match config.format {
        TracingFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(io::stderr)
                .with_target(true)
                .with_thread_ids(true);
            registry.with(layer).try_init()
        }
        TracingFormat::Compact => {
            let layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_target(false);
            registry.with(layer).try_init()
        }
        TracingFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_current_span(true)
                .with_span_list(true);
            registry.with(layer).try_init()
        }
        TracingFormat::Dev => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true);
            registry.with(layer).try_init()
        }
    };
    initialized.map_err(|e| miette::miette!("Failed to install tracing subscriber: {e}"))?;

    tracing::info!(
        correlation_id = %correlation_id(),
        version = env!("CARGO_PKG_VERSION"),
        format = ?config.format,
        "Tracing initialized for simmer"
    );
    Ok(())
}
