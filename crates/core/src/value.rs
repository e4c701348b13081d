//! The value model passed between recipes.
//!
//! [`Value`] is a closed set of variants the engine knows how to fingerprint
//! and persist natively. Anything else enters through [`Value::Custom`], which
//! carries a [`CustomValue`] identified by an explicit type tag. Custom values
//! are handled either by an [`ExtensionHandler`](crate::ExtensionHandler)
//! registered for that tag or by their generic byte dump.

use crate::function::Function;
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A value that lives outside the built-in variants.
pub trait CustomValue: fmt::Debug + Send + Sync + 'static {
    /// Stable tag naming the value's type. Extension handlers are looked up by it.
    fn type_tag(&self) -> &str;

    /// Generic total byte dump of the value, if it has one.
    fn to_bytes(&self) -> Option<Vec<u8>> {
        None
    }

    /// Downcasting support for extension handlers.
    fn as_any(&self) -> &dyn Any;
}

/// Bytes of a custom value read back without a registered decoder.
///
/// Compares equal to any custom value with the same tag and byte dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueBlob {
    tag: String,
    bytes: Vec<u8>,
}

impl OpaqueBlob {
    #[must_use]
    pub fn new(tag: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            tag: tag.into(),
            bytes,
        }
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl CustomValue for OpaqueBlob {
    fn type_tag(&self) -> &str {
        &self.tag
    }

    fn to_bytes(&self) -> Option<Vec<u8>> {
        Some(self.bytes.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A value produced or consumed by a recipe.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// The absent value; also what a recipe with no outputs yields.
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// A filesystem path, fingerprinted by what it points at.
    Path(PathBuf),
    List(Vec<Value>),
    /// Insertion-ordered key/value pairs.
    Map(Vec<(Value, Value)>),
    Function(Function),
    Custom(Arc<dyn CustomValue>),
}

impl Value {
    /// Build a list from anything convertible into values.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Self>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Build a map, keeping the iteration order of `entries`.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Self>,
        V: Into<Self>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(bytes.into())
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn custom(value: impl CustomValue) -> Self {
        Self::Custom(Arc::new(value))
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::Path(_) => "path",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Function(_) => "function",
            Self::Custom(_) => "custom",
        }
    }

    /// The tag that seeds this value's fingerprint.
    #[must_use]
    pub fn type_tag(&self) -> &str {
        match self {
            Self::Custom(custom) => custom.type_tag(),
            other => other.kind(),
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(p) => Some(p),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&[(Self, Self)]> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Downcast a custom value to its concrete type.
    #[must_use]
    pub fn downcast_custom<T: CustomValue>(&self) -> Option<&T> {
        match self {
            Self::Custom(custom) => custom.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Look up `key` in a map value.
    #[must_use]
    pub fn get(&self, key: &Self) -> Option<&Self> {
        self.as_map()?
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => {
                a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
            }
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Path(a), Self::Path(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a.same_identity(b),
            (Self::Custom(a), Self::Custom(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                a.type_tag() == b.type_tag()
                    && matches!((a.to_bytes(), b.to_bytes()), (Some(x), Some(y)) if x == y)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Self::Function(func) => write!(f, "<function {}>", func.name()),
            Self::Custom(custom) => write!(f, "<{}>", custom.type_tag()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<PathBuf> for Value {
    fn from(p: PathBuf) -> Self {
        Self::Path(p)
    }
}

impl From<&Path> for Value {
    fn from(p: &Path) -> Self {
        Self::Path(p.to_path_buf())
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Self::Function(f)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::list(items)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::None, Into::into)
    }
}
