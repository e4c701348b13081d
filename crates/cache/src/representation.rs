//! Persisted form of values.
//!
//! A representation is a JSON document. Strings, integers, finite floats,
//! booleans and the absent value map to their JSON counterparts, and lists map
//! to arrays. Everything else becomes a reference token: a JSON object whose
//! `__simmer__` member names the token kind.
//!
//! | kind    | members                 | stands for                              |
//! |---------|-------------------------|-----------------------------------------|
//! | `bytes` | `file`                  | byte blob spilled to a side file        |
//! | `path`  | `path`, `fingerprint`   | filesystem path and its fingerprint     |
//! | `map`   | `keys`, `values`        | map as two parallel arrays              |
//! | `float` | `value`                 | non-finite float (`NaN`, `inf`, `-inf`) |
//! | `ext`   | `tag`, `file`           | custom value encoded by its handler     |
//! | `dump`  | `tag`, `file`           | custom value's generic byte dump        |
//!
//! Side files are named by the SHA-256 of their bytes and live in the
//! directory passed to [`serialize`].

use crate::error::{Error, Result};
use crate::store::write_atomic;
use serde_json::{Map, Number, json};
use sha2::{Digest, Sha256};
use simmer_core::{Fingerprint, Fingerprinter, OpaqueBlob, UnsupportedReason, Value};
use std::fs;
use std::path::Path;

/// Serialized form of a value.
pub type Representation = serde_json::Value;

/// Member naming the kind of a reference token.
pub const TOKEN_KEY: &str = "__simmer__";

/// Serialize `value`, writing any side files into `dir`.
pub fn serialize(value: &Value, dir: &Path, fingerprinter: &Fingerprinter) -> Result<Representation> {
    Ok(match value {
        Value::None => Representation::Null,
        Value::Bool(b) => Representation::Bool(*b),
        Value::Int(i) => Representation::Number((*i).into()),
        Value::Float(x) => match Number::from_f64(*x) {
            Some(n) => Representation::Number(n),
            None => token("float", [("value", json!(format!("{x:?}")))]),
        },
        Value::Str(s) => Representation::String(s.clone()),
        Value::Bytes(bytes) => token("bytes", [("file", json!(write_side_file(dir, bytes)?))]),
        Value::Path(path) => token(
            "path",
            [
                ("path", json!(path.to_string_lossy())),
                ("fingerprint", json!(fingerprinter.fingerprint_path(path)?)),
            ],
        ),
        Value::List(items) => Representation::Array(
            items
                .iter()
                .map(|item| serialize(item, dir, fingerprinter))
                .collect::<Result<_>>()?,
        ),
        Value::Map(entries) => {
            let mut keys = Vec::with_capacity(entries.len());
            let mut values = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                keys.push(serialize(k, dir, fingerprinter)?);
                values.push(serialize(v, dir, fingerprinter)?);
            }
            token(
                "map",
                [
                    ("keys", Representation::Array(keys)),
                    ("values", Representation::Array(values)),
                ],
            )
        }
        Value::Function(function) => {
            return Err(simmer_core::Error::unsupported(
                format!("function '{}'", function.name()),
                UnsupportedReason::NotSerializable,
            )
            .into());
        }
        Value::Custom(custom) => {
            let tag = custom.type_tag();
            if let Some(handler) = fingerprinter.extensions().get(tag) {
                let bytes = handler.encode(&**custom)?;
                token(
                    "ext",
                    [("tag", json!(tag)), ("file", json!(write_side_file(dir, &bytes)?))],
                )
            } else {
                if !fingerprinter.allows_fallback() {
                    return Err(simmer_core::Error::unsupported(
                        tag,
                        UnsupportedReason::FallbackDisabled,
                    )
                    .into());
                }
                let bytes = custom.to_bytes().ok_or_else(|| {
                    simmer_core::Error::unsupported(tag, UnsupportedReason::NotSerializable)
                })?;
                token(
                    "dump",
                    [("tag", json!(tag)), ("file", json!(write_side_file(dir, &bytes)?))],
                )
            }
        }
    })
}

/// Rebuild a value from its representation, reading side files from `dir`.
pub fn deserialize(repr: &Representation, dir: &Path, fingerprinter: &Fingerprinter) -> Result<Value> {
    match repr {
        Representation::Null => Ok(Value::None),
        Representation::Bool(b) => Ok(Value::Bool(*b)),
        Representation::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else {
                n.as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| Error::malformed(format!("number out of range: {n}")))
            }
        }
        Representation::String(s) => Ok(Value::Str(s.clone())),
        Representation::Array(items) => items
            .iter()
            .map(|item| deserialize(item, dir, fingerprinter))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        Representation::Object(object) => deserialize_token(object, dir, fingerprinter),
    }
}

fn deserialize_token(
    object: &Map<String, Representation>,
    dir: &Path,
    fingerprinter: &Fingerprinter,
) -> Result<Value> {
    let kind = object
        .get(TOKEN_KEY)
        .and_then(Representation::as_str)
        .ok_or_else(|| simmer_core::Error::unknown_token("<untagged object>"))?;

    match kind {
        "bytes" => Ok(Value::Bytes(read_side_file(dir, str_member(object, "file")?)?)),
        "path" => Ok(Value::path(str_member(object, "path")?)),
        "float" => {
            let value = str_member(object, "value")?;
            let x = match value {
                "NaN" => f64::NAN,
                "inf" => f64::INFINITY,
                "-inf" => f64::NEG_INFINITY,
                other => return Err(Error::malformed(format!("unknown float token '{other}'"))),
            };
            Ok(Value::Float(x))
        }
        "map" => {
            let keys = array_member(object, "keys")?;
            let values = array_member(object, "values")?;
            if keys.len() != values.len() {
                return Err(Error::malformed(format!(
                    "map token has {} keys but {} values",
                    keys.len(),
                    values.len()
                )));
            }
            keys.iter()
                .zip(values)
                .map(|(k, v)| {
                    Ok((
                        deserialize(k, dir, fingerprinter)?,
                        deserialize(v, dir, fingerprinter)?,
                    ))
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Map)
        }
        "ext" => {
            let tag = str_member(object, "tag")?;
            let handler = fingerprinter
                .extensions()
                .get(tag)
                .ok_or_else(|| simmer_core::Error::unknown_token(format!("ext:{tag}")))?;
            let bytes = read_side_file(dir, str_member(object, "file")?)?;
            Ok(handler.decode(&bytes)?)
        }
        "dump" => {
            let tag = str_member(object, "tag")?;
            let bytes = read_side_file(dir, str_member(object, "file")?)?;
            Ok(Value::custom(OpaqueBlob::new(tag, bytes)))
        }
        other => Err(simmer_core::Error::unknown_token(other).into()),
    }
}

/// Whether every path reference inside `repr` still fingerprints the same.
#[must_use]
pub fn is_valid(repr: &Representation, fingerprinter: &Fingerprinter) -> bool {
    match repr {
        Representation::Array(items) => items.iter().all(|item| is_valid(item, fingerprinter)),
        Representation::Object(object) => match object.get(TOKEN_KEY).and_then(Representation::as_str) {
            Some("path") => {
                let (Some(path), Some(stored)) = (
                    object.get("path").and_then(Representation::as_str),
                    object.get("fingerprint").and_then(Representation::as_str),
                ) else {
                    return false;
                };
                fingerprinter
                    .fingerprint_path(Path::new(path))
                    .is_ok_and(|current| current == Fingerprint::from(stored))
            }
            Some("map") => ["keys", "values"].iter().all(|member| {
                object
                    .get(*member)
                    .is_some_and(|items| is_valid(items, fingerprinter))
            }),
            _ => true,
        },
        _ => true,
    }
}

fn token<const N: usize>(kind: &str, members: [(&str, Representation); N]) -> Representation {
    let mut object = Map::new();
    object.insert(TOKEN_KEY.to_string(), json!(kind));
    for (key, value) in members {
        object.insert(key.to_string(), value);
    }
    Representation::Object(object)
}

fn str_member<'a>(object: &'a Map<String, Representation>, key: &str) -> Result<&'a str> {
    object
        .get(key)
        .and_then(Representation::as_str)
        .ok_or_else(|| Error::malformed(format!("token is missing string member '{key}'")))
}

fn array_member<'a>(
    object: &'a Map<String, Representation>,
    key: &str,
) -> Result<&'a Vec<Representation>> {
    object
        .get(key)
        .and_then(Representation::as_array)
        .ok_or_else(|| Error::malformed(format!("token is missing array member '{key}'")))
}

fn write_side_file(dir: &Path, bytes: &[u8]) -> Result<String> {
    let name = format!("{}.bin", hex::encode(Sha256::digest(bytes)));
    let path = dir.join(&name);
    if !path.exists() {
        write_atomic(&path, bytes)?;
        tracing::trace!(path = %path.display(), size = bytes.len(), "Wrote side file");
    }
    Ok(name)
}

fn read_side_file(dir: &Path, name: &str) -> Result<Vec<u8>> {
    if name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(Error::malformed(format!("invalid side file name '{name}'")));
    }
    let path = dir.join(name);
    fs::read(&path).map_err(|e| Error::io(e, &path, "read"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use simmer_core::{CustomValue, ExtensionHandler, ExtensionRegistry, Function};
    use std::any::Any;
    use std::borrow::Cow;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn round_trip(value: &Value) -> Value {
        let tmp = TempDir::new().unwrap();
        let hasher = Fingerprinter::default();
        let repr = serialize(value, tmp.path(), &hasher).unwrap();
        deserialize(&repr, tmp.path(), &hasher).unwrap()
    }

    #[test]
    fn test_primitives_pass_through() {
        let tmp = TempDir::new().unwrap();
        let hasher = Fingerprinter::default();
        let value = Value::list([Value::Int(3), Value::from("s"), Value::Bool(true), Value::None]);
        let repr = serialize(&value, tmp.path(), &hasher).unwrap();
        assert_eq!(repr, json!([3, "s", true, null]));
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_floats_keep_their_variant() {
        assert_eq!(round_trip(&Value::Float(1.0)), Value::Float(1.0));
        assert_eq!(round_trip(&Value::Float(f64::NAN)), Value::Float(f64::NAN));
        assert_eq!(round_trip(&Value::Float(f64::NEG_INFINITY)), Value::Float(f64::NEG_INFINITY));
        assert_eq!(round_trip(&Value::Int(1)), Value::Int(1));
    }

    #[test]
    fn test_bytes_spill_to_side_file() {
        let tmp = TempDir::new().unwrap();
        let hasher = Fingerprinter::default();
        let value = Value::bytes(vec![0u8, 159, 146, 150]);
        let repr = serialize(&value, tmp.path(), &hasher).unwrap();
        assert_eq!(repr[TOKEN_KEY], "bytes");
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
        assert_eq!(deserialize(&repr, tmp.path(), &hasher).unwrap(), value);
    }

    #[test]
    fn test_nested_map_round_trip() {
        let value = Value::map([
            (Value::Int(1), Value::list(["a", "b"])),
            (Value::list([1, 2]), Value::map([("inner", Value::bytes(b"xyz".to_vec()))])),
        ]);
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn test_path_validity_tracks_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("input.txt");
        fs::write(&file, "v1").unwrap();
        let hasher = Fingerprinter::default();

        let repr = serialize(&Value::list([Value::path(&file)]), tmp.path(), &hasher).unwrap();
        assert!(is_valid(&repr, &hasher));
        assert_eq!(
            deserialize(&repr, tmp.path(), &hasher).unwrap(),
            Value::list([Value::path(&file)])
        );

        fs::write(&file, "v2").unwrap();
        assert!(!is_valid(&repr, &hasher));
    }

    #[test]
    fn test_unknown_token_fails() {
        let tmp = TempDir::new().unwrap();
        let hasher = Fingerprinter::default();
        let repr = json!({ TOKEN_KEY: "teleport" });
        match deserialize(&repr, tmp.path(), &hasher) {
            Err(Error::Core(simmer_core::Error::UnknownToken { token })) => {
                assert_eq!(token, "teleport");
            }
            other => panic!("expected unknown token, got {other:?}"),
        }
    }

    #[test]
    fn test_functions_are_not_serializable() {
        let tmp = TempDir::new().unwrap();
        let f = Function::new("f", |_| Ok(Value::None));
        assert!(matches!(
            serialize(&Value::Function(f), tmp.path(), &Fingerprinter::default()),
            Err(Error::Core(simmer_core::Error::UnsupportedValue { .. }))
        ));
    }

    #[derive(Debug)]
    struct Grid(Vec<u8>);

    impl CustomValue for Grid {
        fn type_tag(&self) -> &str {
            "grid"
        }

        fn to_bytes(&self) -> Option<Vec<u8>> {
            Some(self.0.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct GridHandler;

    impl ExtensionHandler for GridHandler {
        fn tag(&self) -> &str {
            "grid"
        }

        fn raw_buffer<'a>(&self, value: &'a dyn CustomValue) -> Option<Cow<'a, [u8]>> {
            value
                .as_any()
                .downcast_ref::<Grid>()
                .map(|g| Cow::Borrowed(g.0.as_slice()))
        }

        fn encode(&self, value: &dyn CustomValue) -> simmer_core::Result<Vec<u8>> {
            self.raw_buffer(value)
                .map(Cow::into_owned)
                .ok_or_else(|| simmer_core::Error::serialization("not a grid"))
        }

        fn decode(&self, bytes: &[u8]) -> simmer_core::Result<Value> {
            Ok(Value::custom(Grid(bytes.to_vec())))
        }
    }

    #[test]
    fn test_extension_round_trip_and_missing_handler() {
        let tmp = TempDir::new().unwrap();
        let mut registry = ExtensionRegistry::new();
        registry.register(GridHandler);
        let with_ext = Fingerprinter::default().with_extensions(Arc::new(registry));

        let value = Value::custom(Grid(vec![1, 2, 3]));
        let repr = serialize(&value, tmp.path(), &with_ext).unwrap();
        assert_eq!(repr[TOKEN_KEY], "ext");
        let back = deserialize(&repr, tmp.path(), &with_ext).unwrap();
        assert_eq!(back.downcast_custom::<Grid>().unwrap().0, vec![1, 2, 3]);

        let without = Fingerprinter::default();
        assert!(matches!(
            deserialize(&repr, tmp.path(), &without),
            Err(Error::Core(simmer_core::Error::UnknownToken { .. }))
        ));
    }

    #[test]
    fn test_dump_fallback() {
        let tmp = TempDir::new().unwrap();
        let value = Value::custom(Grid(vec![9, 9]));

        let repr = serialize(&value, tmp.path(), &Fingerprinter::default()).unwrap();
        assert_eq!(repr[TOKEN_KEY], "dump");
        let back = deserialize(&repr, tmp.path(), &Fingerprinter::default()).unwrap();
        assert_eq!(back, value);
        assert!(back.downcast_custom::<OpaqueBlob>().is_some());

        let strict = Fingerprinter::default().with_fallback(false);
        assert!(matches!(
            serialize(&value, tmp.path(), &strict),
            Err(Error::Core(simmer_core::Error::UnsupportedValue {
                reason: UnsupportedReason::FallbackDisabled,
                ..
            }))
        ));
    }
}
