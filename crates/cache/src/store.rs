//! Per-recipe record files.
//!
//! Each recipe keeps one JSON record at
//! `<cache dir>/<namespace>/<name>/record.json`. Side files for its outputs
//! live next to it, under `<cache dir>/<namespace>/<name>/<fingerprint>/`.
//! Records are written atomically so an interrupted write never leaves a
//! half-written record behind.

use crate::error::{Error, Result};
use crate::representation::Representation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use simmer_core::Fingerprint;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Schema version of record files. Records with another version are ignored.
pub const RECORD_VERSION: u32 = 1;

/// File name of a recipe record.
pub const RECORD_FILE: &str = "record.json";

/// Container shape of a foreach recipe's mapped input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    List,
    Map,
}

/// Persisted state of one recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRecord {
    pub version: u32,
    pub name: String,
    pub updated_at: DateTime<Utc>,
    pub input_fingerprints: Vec<Fingerprint>,
    pub outputs: Vec<Representation>,
    pub output_fingerprints: Vec<Fingerprint>,
    #[serde(default)]
    pub function_fingerprint: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreach: Option<ForeachRecord>,
}

impl RecipeRecord {
    /// A record for `name` stamped with the current schema version and time.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: RECORD_VERSION,
            name: name.into(),
            updated_at: Utc::now(),
            input_fingerprints: Vec::new(),
            outputs: Vec::new(),
            output_fingerprints: Vec::new(),
            function_fingerprint: None,
            foreach: None,
        }
    }
}

/// Per-element state of a foreach recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeachRecord {
    pub shape: Shape,
    pub mapped_fingerprint: Fingerprint,
    pub elements: Vec<ElementRecord>,
}

/// One element of a foreach recipe's mapped input.
///
/// `output` is absent for elements that have not completed yet. Map elements
/// also carry their key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Representation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_fingerprint: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ElementOutput>,
}

/// A completed element: its input fingerprint and cached output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementOutput {
    pub input_fingerprint: Fingerprint,
    pub output: Representation,
    pub output_fingerprint: Fingerprint,
}

/// Reads and writes recipe records under one cache directory.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory owned by one recipe.
    #[must_use]
    pub fn recipe_dir(&self, namespace: &str, name: &str) -> PathBuf {
        self.root
            .join(sanitize_segment(namespace))
            .join(sanitize_segment(name))
    }

    #[must_use]
    pub fn record_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.recipe_dir(namespace, name).join(RECORD_FILE)
    }

    /// Load a recipe's record.
    ///
    /// Missing, unreadable or outdated records all mean "no prior state".
    #[must_use]
    pub fn load(&self, namespace: &str, name: &str) -> Option<RecipeRecord> {
        let path = self.record_path(namespace, name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read recipe record");
                return None;
            }
        };

        let record: RecipeRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unparseable recipe record");
                return None;
            }
        };

        if record.version != RECORD_VERSION {
            tracing::warn!(
                path = %path.display(),
                found = record.version,
                expected = RECORD_VERSION,
                "Ignoring recipe record with a different schema version"
            );
            return None;
        }
        if record.name != name {
            tracing::warn!(
                path = %path.display(),
                found = %record.name,
                expected = %name,
                "Ignoring recipe record written for another recipe"
            );
            return None;
        }

        tracing::debug!(recipe = %name, path = %path.display(), "Loaded recipe record");
        Some(record)
    }

    /// Write a recipe's record atomically.
    pub fn save(&self, namespace: &str, record: &RecipeRecord) -> Result<()> {
        let path = self.record_path(namespace, &record.name);
        let bytes = serde_json::to_vec_pretty(record)?;
        write_atomic(&path, &bytes)?;
        tracing::debug!(recipe = %record.name, path = %path.display(), "Saved recipe record");
        Ok(())
    }

    /// Delete a recipe's record and side files. Returns whether anything was removed.
    pub fn remove(&self, namespace: &str, name: &str) -> Result<bool> {
        let dir = self.recipe_dir(namespace, name);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::debug!(recipe = %name, dir = %dir.display(), "Removed recipe state");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(e, &dir, "remove_dir_all")),
        }
    }
}

/// Map an arbitrary name onto a single safe path segment.
fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}

/// Write `data` to `path` through a temporary file and a rename.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create_dir_all"))?;
    }

    let tmp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    let mut file = fs::File::create(&tmp_path).map_err(|e| Error::io(e, &tmp_path, "create"))?;
    file.write_all(data)
        .map_err(|e| Error::io(e, &tmp_path, "write"))?;
    file.sync_all()
        .map_err(|e| Error::io(e, &tmp_path, "sync"))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| Error::io(e, path, "rename"))?;
    Ok(())
}
