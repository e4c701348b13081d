//! Engine configuration.
//!
//! A [`Config`] is built once and handed to the engine explicitly. It can come
//! from defaults, a TOML document or environment variable overrides.

use crate::error::{Error, Result};
use crate::fingerprint::FileChecksum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the directory holding all recipe records under the cache root.
pub const CACHE_DIR_NAME: &str = ".simmer";

/// Environment variable overriding the cache root.
pub const ENV_CACHE_DIR: &str = "SIMMER_CACHE_DIR";
/// Environment variable toggling persistence.
pub const ENV_CACHE_ENABLED: &str = "SIMMER_CACHE_ENABLED";
/// Environment variable selecting the file checksum policy.
pub const ENV_FILE_CHECKSUM: &str = "SIMMER_FILE_CHECKSUM";
/// Environment variable toggling fallback serialization.
pub const ENV_ALLOW_FALLBACK: &str = "SIMMER_ALLOW_FALLBACK";

/// Configuration consumed by the engine, the hasher and the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Persist recipe state between runs.
    pub cache_enabled: bool,

    /// Directory under which `.simmer/` is created. Must exist and be writable when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_root: Option<PathBuf>,

    /// How filesystem paths are fingerprinted.
    pub file_checksum: FileChecksum,

    /// Hash and persist custom values through their generic byte dump.
    pub allow_fallback_serialization: bool,

    /// Namespace for recipes that do not declare one.
    pub default_namespace: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_root: None,
            file_checksum: FileChecksum::ContentHash,
            allow_fallback_serialization: true,
            default_namespace: "main".to_string(),
        }
    }
}

impl Config {
    /// Parse a configuration from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source)
            .map_err(|e| Error::configuration(format!("Invalid configuration: {e}")))
    }

    /// Defaults with environment variable overrides applied.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `SIMMER_*` environment variable overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(dir) = std::env::var_os(ENV_CACHE_DIR).filter(|v| !v.is_empty()) {
            self.cache_root = Some(PathBuf::from(dir));
        }
        if let Ok(value) = std::env::var(ENV_CACHE_ENABLED) {
            self.cache_enabled = parse_bool(ENV_CACHE_ENABLED, &value)?;
        }
        if let Ok(value) = std::env::var(ENV_FILE_CHECKSUM) {
            self.file_checksum = value.parse()?;
        }
        if let Ok(value) = std::env::var(ENV_ALLOW_FALLBACK) {
            self.allow_fallback_serialization = parse_bool(ENV_ALLOW_FALLBACK, &value)?;
        }
        Ok(self)
    }

    #[must_use]
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(root.into());
        self
    }

    #[must_use]
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_file_checksum(mut self, checksum: FileChecksum) -> Self {
        self.file_checksum = checksum;
        self
    }

    #[must_use]
    pub fn with_fallback_serialization(mut self, allow: bool) -> Self {
        self.allow_fallback_serialization = allow;
        self
    }

    /// Check that a configured cache root exists and is writable.
    pub fn validate(&self) -> Result<()> {
        if self.default_namespace.is_empty() {
            return Err(Error::configuration("default namespace must not be empty"));
        }
        if let Some(root) = &self.cache_root {
            if !root.is_dir() {
                return Err(Error::configuration(format!(
                    "cache root {} does not exist or is not a directory",
                    root.display()
                )));
            }
            if !is_writable(root) {
                return Err(Error::configuration(format!(
                    "cache root {} is not writable",
                    root.display()
                )));
            }
        }
        Ok(())
    }

    /// Directory holding every recipe record, `<root>/.simmer`.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let root = cache_root_from_inputs(CacheRootInputs {
            configured: self.cache_root.clone(),
            env_dir: std::env::var_os(ENV_CACHE_DIR).map(PathBuf::from),
            cwd: std::env::current_dir().ok(),
            os_cache_dir: dirs::cache_dir(),
        })?;
        Ok(root.join(CACHE_DIR_NAME))
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::configuration(format!(
            "{var} must be a boolean, got '{other}'"
        ))),
    }
}

fn is_writable(dir: &Path) -> bool {
    let probe = dir.join(".write_probe");
    match std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&probe)
    {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

/// Inputs for determining the cache root
#[derive(Debug, Clone)]
struct CacheRootInputs {
    configured: Option<PathBuf>,
    env_dir: Option<PathBuf>,
    cwd: Option<PathBuf>,
    os_cache_dir: Option<PathBuf>,
}

fn cache_root_from_inputs(inputs: CacheRootInputs) -> Result<PathBuf> {
    // An explicit root is authoritative: it must already be usable.
    if let Some(root) = inputs.configured.filter(|p| !p.as_os_str().is_empty()) {
        if root.is_dir() && is_writable(&root) {
            return Ok(root);
        }
        return Err(Error::configuration(format!(
            "cache root {} does not exist or is not writable",
            root.display()
        )));
    }

    // Resolution order (first writable wins):
    // 1) SIMMER_CACHE_DIR
    // 2) current working directory
    // 3) OS cache dir/simmer
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(dir) = inputs.env_dir.filter(|p| !p.as_os_str().is_empty()) {
        candidates.push(dir);
    }
    if let Some(cwd) = inputs.cwd {
        candidates.push(cwd);
    }
    if let Some(os_cache) = inputs.os_cache_dir {
        candidates.push(os_cache.join("simmer"));
    }

    for path in candidates {
        if path.exists() {
            if is_writable(&path) {
                return Ok(path);
            }
            tracing::debug!(path = %path.display(), "Cache root candidate not writable");
            continue;
        }
        if std::fs::create_dir_all(&path).is_ok() {
            return Ok(path);
        }
    }

    Err(Error::configuration(
        "no writable cache root found; set SIMMER_CACHE_DIR",
    ))
}
