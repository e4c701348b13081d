//! Structural fingerprinting of values.
//!
//! A fingerprint is the hex SHA-256 of a framed byte stream. Every value
//! writes its type tag first and then its content, so values of different
//! variants never collide and nested containers stay unambiguous. The absent
//! value is special-cased to the literal fingerprint `"None"`.

use crate::error::{Error, Result, UnsupportedReason};
use crate::extension::ExtensionRegistry;
use crate::function::Function;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// Stable fingerprint string of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of the absent value.
    pub const NONE: &'static str = "None";

    #[must_use]
    pub fn none() -> Self {
        Self(Self::NONE.to_string())
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0 == Self::NONE
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// How filesystem paths are fingerprinted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileChecksum {
    /// Hash the file's bytes.
    #[default]
    ContentHash,
    /// Hash the file's modification time.
    ModificationTime,
}

impl FromStr for FileChecksum {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "content-hash" | "content" => Ok(Self::ContentHash),
            "modification-time" | "mtime" => Ok(Self::ModificationTime),
            _ => Err(Error::configuration(format!(
                "Unknown file checksum policy: {s} (expected content-hash or modification-time)"
            ))),
        }
    }
}

impl fmt::Display for FileChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContentHash => write!(f, "content-hash"),
            Self::ModificationTime => write!(f, "modification-time"),
        }
    }
}

/// Computes fingerprints under a fixed checksum policy and extension set.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    checksum: FileChecksum,
    allow_fallback: bool,
    extensions: Arc<ExtensionRegistry>,
}

impl Fingerprinter {
    #[must_use]
    pub fn new(checksum: FileChecksum) -> Self {
        Self {
            checksum,
            allow_fallback: true,
            extensions: Arc::new(ExtensionRegistry::new()),
        }
    }

    /// Allow or forbid hashing custom values through their generic byte dump.
    #[must_use]
    pub fn with_fallback(mut self, allow: bool) -> Self {
        self.allow_fallback = allow;
        self
    }

    #[must_use]
    pub fn with_extensions(mut self, extensions: Arc<ExtensionRegistry>) -> Self {
        self.extensions = extensions;
        self
    }

    #[must_use]
    pub fn checksum(&self) -> FileChecksum {
        self.checksum
    }

    #[must_use]
    pub fn allows_fallback(&self) -> bool {
        self.allow_fallback
    }

    #[must_use]
    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// Fingerprint a value.
    pub fn fingerprint(&self, value: &Value) -> Result<Fingerprint> {
        if value.is_none() {
            return Ok(Fingerprint::none());
        }
        let mut stream = Stream::default();
        self.write_value(&mut stream, value)?;
        Ok(stream.finish())
    }

    /// Fingerprint a path under the configured checksum policy.
    pub fn fingerprint_path(&self, path: &Path) -> Result<Fingerprint> {
        let mut stream = Stream::default();
        self.write_path(&mut stream, path)?;
        Ok(stream.finish())
    }

    /// Fingerprint a function's identity.
    pub fn fingerprint_function(&self, function: &Function) -> Result<Fingerprint> {
        let mut stream = Stream::default();
        self.write_function(&mut stream, function)?;
        Ok(stream.finish())
    }

    /// Summarize a sequence of fingerprints as one.
    #[must_use]
    pub fn combine<'a>(fingerprints: impl IntoIterator<Item = &'a Fingerprint>) -> Fingerprint {
        let mut stream = Stream::default();
        stream.frame(b"aggregate");
        for fp in fingerprints {
            stream.frame(fp.as_str().as_bytes());
        }
        stream.finish()
    }

    fn write_value(&self, stream: &mut Stream, value: &Value) -> Result<()> {
        match value {
            Value::None => stream.frame(b"none"),
            Value::Bool(b) => {
                stream.frame(b"bool");
                stream.frame(if *b { b"true".as_slice() } else { b"false".as_slice() });
            }
            Value::Int(i) => {
                stream.frame(b"int");
                stream.frame(i.to_string().as_bytes());
            }
            Value::Float(x) => {
                stream.frame(b"float");
                stream.frame(format!("{x:?}").as_bytes());
            }
            Value::Str(s) => {
                stream.frame(b"str");
                stream.frame(s.as_bytes());
            }
            Value::Bytes(bytes) => {
                stream.frame(b"bytes");
                stream.frame(bytes);
            }
            Value::Path(path) => self.write_path(stream, path)?,
            Value::List(items) => {
                stream.frame(b"list");
                stream.count(items.len());
                for item in items {
                    self.write_value(stream, item)?;
                }
            }
            Value::Map(entries) => {
                stream.frame(b"map");
                stream.count(entries.len());
                for (key, value) in entries {
                    self.write_value(stream, key)?;
                    self.write_value(stream, value)?;
                }
            }
            Value::Function(function) => self.write_function(stream, function)?,
            Value::Custom(custom) => {
                let tag = custom.type_tag();
                stream.frame(b"custom");
                stream.frame(tag.as_bytes());
                if let Some(buffer) = self
                    .extensions
                    .get(tag)
                    .and_then(|handler| handler.raw_buffer(&**custom))
                {
                    stream.frame(&buffer);
                    return Ok(());
                }
                if !self.allow_fallback {
                    return Err(Error::unsupported(tag, UnsupportedReason::FallbackDisabled));
                }
                let bytes = custom
                    .to_bytes()
                    .ok_or_else(|| Error::unsupported(tag, UnsupportedReason::NotSerializable))?;
                stream.frame(&bytes);
            }
        }
        Ok(())
    }

    fn write_function(&self, stream: &mut Stream, function: &Function) -> Result<()> {
        stream.frame(b"function");
        stream.frame(function.version_tag().as_bytes());
        for entries in [function.defaults(), function.captures()] {
            stream.count(entries.len());
            for (name, value) in entries {
                stream.frame(name.as_bytes());
                self.write_value(stream, value)?;
            }
        }
        Ok(())
    }

    fn write_path(&self, stream: &mut Stream, path: &Path) -> Result<()> {
        stream.frame(b"path");
        stream.frame(path.to_string_lossy().as_bytes());

        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::io(e, path, "stat")),
        };
        if metadata.is_dir() {
            stream.frame(b"dir");
            return Ok(());
        }

        match self.checksum {
            FileChecksum::ContentHash => {
                stream.frame(b"content");
                let mut file = fs::File::open(path).map_err(|e| Error::io(e, path, "open"))?;
                let mut buf = [0u8; 1024 * 64];
                let mut total: u64 = 0;
                loop {
                    let n = file.read(&mut buf).map_err(|e| Error::io(e, path, "read"))?;
                    if n == 0 {
                        break;
                    }
                    stream.raw(&buf[..n]);
                    total += n as u64;
                }
                stream.frame(total.to_string().as_bytes());
                tracing::trace!(path = %path.display(), size = total, "Hashed file");
            }
            FileChecksum::ModificationTime => {
                stream.frame(b"mtime");
                let modified = metadata
                    .modified()
                    .map_err(|e| Error::io(e, path, "read modification time"))?;
                let nanos = modified
                    .duration_since(UNIX_EPOCH)
                    .map_or(0, |d| d.as_nanos());
                stream.frame(nanos.to_string().as_bytes());
            }
        }
        Ok(())
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(FileChecksum::default())
    }
}

/// Length-framed SHA-256 stream.
#[derive(Default)]
struct Stream(Sha256);

impl Stream {
    fn frame(&mut self, bytes: &[u8]) {
        self.count(bytes.len());
        self.0.update(bytes);
    }

    fn count(&mut self, n: usize) {
        self.0.update((n as u64).to_le_bytes());
    }

    fn raw(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finish(self) -> Fingerprint {
        Fingerprint(hex::encode(self.0.finalize()))
    }
}
