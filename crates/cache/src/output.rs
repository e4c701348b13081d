//! Produced values paired with their fingerprints.

use crate::error::Result;
use crate::representation::{self, Representation};
use simmer_core::{Fingerprint, Fingerprinter, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// A recipe output: a value and the fingerprint it had when produced.
///
/// A *materialized* output holds its value in memory and checks validity by
/// re-fingerprinting it. A *cached* output holds the persisted representation,
/// checks validity against it and only deserializes the value on demand.
#[derive(Clone)]
pub struct Output {
    fingerprint: Fingerprint,
    fingerprinter: Arc<Fingerprinter>,
    state: State,
}

#[derive(Clone)]
enum State {
    Materialized(Value),
    Cached {
        representation: Representation,
        dir: PathBuf,
        value: OnceLock<Value>,
    },
}

impl Output {
    /// Wrap an in-memory value, fingerprinting it now.
    pub fn materialize(value: Value, fingerprinter: Arc<Fingerprinter>) -> Result<Self> {
        let fingerprint = fingerprinter.fingerprint(&value)?;
        Ok(Self {
            fingerprint,
            fingerprinter,
            state: State::Materialized(value),
        })
    }

    /// Restore an output from its persisted representation.
    #[must_use]
    pub fn from_representation(
        representation: Representation,
        fingerprint: Fingerprint,
        dir: PathBuf,
        fingerprinter: Arc<Fingerprinter>,
    ) -> Self {
        Self {
            fingerprint,
            fingerprinter,
            state: State::Cached {
                representation,
                dir,
                value: OnceLock::new(),
            },
        }
    }

    /// The value, deserialized on first access if this output is cached.
    pub fn value(&self) -> Result<&Value> {
        match &self.state {
            State::Materialized(value) => Ok(value),
            State::Cached {
                representation,
                dir,
                value,
            } => {
                if let Some(v) = value.get() {
                    return Ok(v);
                }
                let loaded = representation::deserialize(representation, dir, &self.fingerprinter)?;
                Ok(value.get_or_init(|| loaded))
            }
        }
    }

    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Whether the output still matches what was produced.
    #[must_use]
    pub fn valid(&self) -> bool {
        match &self.state {
            State::Materialized(value) => self
                .fingerprinter
                .fingerprint(value)
                .is_ok_and(|current| current == self.fingerprint),
            State::Cached { representation, .. } => {
                representation::is_valid(representation, &self.fingerprinter)
            }
        }
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        matches!(self.state, State::Cached { .. })
    }

    /// The persisted representation, if this output has been cached.
    #[must_use]
    pub fn representation(&self) -> Option<&Representation> {
        match &self.state {
            State::Cached { representation, .. } => Some(representation),
            State::Materialized(_) => None,
        }
    }

    /// Directory holding this output's side files, if cached.
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        match &self.state {
            State::Cached { dir, .. } => Some(dir),
            State::Materialized(_) => None,
        }
    }
}

/// Persist `output` under `base_dir/<fingerprint>/` and return the cached form.
///
/// The returned output keeps the in-memory value, so no reload is needed in
/// the same process. Outputs already cached under `base_dir` are returned as is.
pub fn cache(output: &Output, base_dir: &Path) -> Result<Output> {
    let dir = base_dir.join(output.fingerprint.as_str());
    if output.dir() == Some(dir.as_path()) {
        return Ok(output.clone());
    }

    let value = output.value()?;
    let representation = representation::serialize(value, &dir, &output.fingerprinter)?;
    tracing::trace!(fingerprint = %output.fingerprint, dir = %dir.display(), "Cached output");

    Ok(Output {
        fingerprint: output.fingerprint.clone(),
        fingerprinter: Arc::clone(&output.fingerprinter),
        state: State::Cached {
            representation,
            dir,
            value: OnceLock::from(value.clone()),
        },
    })
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Output");
        s.field("fingerprint", &self.fingerprint);
        match &self.state {
            State::Materialized(value) => s.field("value", value),
            State::Cached { representation, .. } => s.field("representation", representation),
        };
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simmer_core::FileChecksum;
    use std::fs;
    use tempfile::TempDir;

    fn hasher() -> Arc<Fingerprinter> {
        Arc::new(Fingerprinter::default())
    }

    #[test]
    fn test_materialized_validity_follows_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("out.txt");
        fs::write(&file, "first").unwrap();

        let output = Output::materialize(Value::path(&file), hasher()).unwrap();
        assert!(output.valid());
        assert!(!output.is_cached());

        fs::write(&file, "second").unwrap();
        assert!(!output.valid());
    }

    #[test]
    fn test_cache_writes_under_fingerprint_dir() {
        let tmp = TempDir::new().unwrap();
        let output = Output::materialize(Value::bytes(b"payload".to_vec()), hasher()).unwrap();
        let cached = cache(&output, tmp.path()).unwrap();

        assert!(cached.is_cached());
        assert_eq!(cached.fingerprint(), output.fingerprint());
        let dir = tmp.path().join(output.fingerprint().as_str());
        assert_eq!(cached.dir(), Some(dir.as_path()));
        assert!(dir.is_dir());
        assert!(cached.valid());

        let again = cache(&cached, tmp.path()).unwrap();
        assert_eq!(again.representation(), cached.representation());
    }

    #[test]
    fn test_cached_output_loads_lazily() {
        let tmp = TempDir::new().unwrap();
        let value = Value::map([("k", Value::bytes(vec![1, 2]))]);
        let cached = cache(&Output::materialize(value.clone(), hasher()).unwrap(), tmp.path()).unwrap();

        let restored = Output::from_representation(
            cached.representation().unwrap().clone(),
            cached.fingerprint().clone(),
            cached.dir().unwrap().to_path_buf(),
            hasher(),
        );
        assert_eq!(restored.value().unwrap(), &value);
    }

    #[test]
    fn test_cached_validity_uses_representation() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("data.bin");
        fs::write(&file, "same").unwrap();

        let mtime = Arc::new(Fingerprinter::new(FileChecksum::ModificationTime));
        let output = Output::materialize(Value::list([Value::path(&file)]), mtime).unwrap();
        let cached = cache(&output, &tmp.path().join("cache")).unwrap();
        assert!(cached.valid());

        fs::remove_file(&file).unwrap();
        assert!(!cached.valid());
    }
}
