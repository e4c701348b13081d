//! Bound functions and their fingerprint identity.
//!
//! Compiled closures cannot be inspected, so a [`Function`] carries its identity
//! explicitly: a version tag, named default arguments and named captured values.
//! Two functions with the same identity fingerprint the same regardless of their
//! display names. Changing a body without bumping its version (or one of the
//! values it declares) goes unnoticed by the cache.

use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Error type returned by user function bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

type Body = dyn Fn(&Args<'_>) -> Result<Vec<Value>, BoxError> + Send + Sync;

/// A user-supplied computation with an explicit fingerprint identity.
#[derive(Clone)]
pub struct Function {
    name: String,
    version: String,
    defaults: Vec<(String, Value)>,
    captures: Vec<(String, Value)>,
    body: Arc<Body>,
}

impl Function {
    /// A function returning a single value, stored as a 1-tuple.
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Args<'_>) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::from_body(name, Arc::new(move |args: &Args<'_>| Ok(vec![body(args)?])))
    }

    /// A function returning a fixed-arity tuple of values.
    pub fn multi<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Args<'_>) -> Result<Vec<Value>, BoxError> + Send + Sync + 'static,
    {
        Self::from_body(name, Arc::new(body))
    }

    /// A function with no return value.
    pub fn unit<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Args<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::from_body(
            name,
            Arc::new(move |args: &Args<'_>| {
                body(args)?;
                Ok(Vec::new())
            }),
        )
    }

    fn from_body(name: impl Into<String>, body: Arc<Body>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            defaults: Vec::new(),
            captures: Vec::new(),
            body,
        }
    }

    /// Set the version tag. Bump it whenever the body changes.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Declare a default argument, replacing any earlier one with the same name.
    #[must_use]
    pub fn default_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        upsert(&mut self.defaults, name.into(), value.into());
        self
    }

    /// Declare a captured value, replacing any earlier one with the same name.
    #[must_use]
    pub fn capture(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        upsert(&mut self.captures, name.into(), value.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn version_tag(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn defaults(&self) -> &[(String, Value)] {
        &self.defaults
    }

    #[must_use]
    pub fn captures(&self) -> &[(String, Value)] {
        &self.captures
    }

    /// Whether two functions share the same fingerprint identity.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.version == other.version
            && self.defaults == other.defaults
            && self.captures == other.captures
    }

    /// Run the body on positional inputs.
    pub fn call(&self, inputs: Vec<Value>) -> Result<Vec<Value>, BoxError> {
        let args = Args {
            inputs,
            function: self,
        };
        (self.body)(&args)
    }
}

fn upsert(entries: &mut Vec<(String, Value)>, name: String, value: Value) {
    match entries.iter_mut().find(|(n, _)| *n == name) {
        Some(entry) => entry.1 = value,
        None => entries.push((name, value)),
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("defaults", &self.defaults)
            .field("captures", &self.captures)
            .finish_non_exhaustive()
    }
}

/// What a function body sees when it runs.
pub struct Args<'a> {
    inputs: Vec<Value>,
    function: &'a Function,
}

impl Args<'_> {
    #[must_use]
    pub fn inputs(&self) -> &[Value] {
        &self.inputs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Positional input `index`, or an error naming the function if it is missing.
    pub fn get(&self, index: usize) -> Result<&Value, BoxError> {
        self.inputs.get(index).ok_or_else(|| {
            format!(
                "function '{}' expected at least {} input(s), got {}",
                self.function.name,
                index + 1,
                self.inputs.len()
            )
            .into()
        })
    }

    /// A declared captured value.
    #[must_use]
    pub fn captured(&self, name: &str) -> Option<&Value> {
        lookup(&self.function.captures, name)
    }

    /// A declared default argument.
    #[must_use]
    pub fn default_arg(&self, name: &str) -> Option<&Value> {
        lookup(&self.function.defaults, name)
    }
}

fn lookup<'v>(entries: &'v [(String, Value)], name: &str) -> Option<&'v Value> {
    entries.iter().find_map(|(n, v)| (n == name).then_some(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapping_forms() {
        let single = Function::new("one", |_| Ok(Value::Int(1)));
        assert_eq!(single.call(vec![]).unwrap(), vec![Value::Int(1)]);

        let pair = Function::multi("pair", |_| Ok(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(pair.call(vec![]).unwrap().len(), 2);

        let unit = Function::unit("nothing", |_| Ok(()));
        assert!(unit.call(vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_args_access() {
        let f = Function::new("join", |args| {
            let sep = args.default_arg("sep").and_then(Value::as_str).unwrap_or("");
            let a = args.get(0)?.as_str().unwrap_or_default();
            let b = args.get(1)?.as_str().unwrap_or_default();
            Ok(Value::from(format!("{a}{sep}{b}")))
        })
        .default_arg("sep", "-");

        let out = f.call(vec!["x".into(), "y".into()]).unwrap();
        assert_eq!(out, vec![Value::from("x-y")]);

        let err = f.call(vec!["x".into()]).unwrap_err();
        assert!(err.to_string().contains("expected at least 2"));
    }

    #[test]
    fn test_identity_ignores_name() {
        let a = Function::new("a", |_| Ok(Value::None)).capture("n", 3);
        let b = Function::new("b", |_| Ok(Value::None)).capture("n", 3);
        let c = Function::new("a", |_| Ok(Value::None)).capture("n", 4);
        assert!(a.same_identity(&b));
        assert!(!a.same_identity(&c));
        assert!(!a.same_identity(&a.clone().version("2")));
    }

    #[test]
    fn test_capture_replaces_same_name() {
        let f = Function::new("f", |args| Ok(args.captured("n").cloned().unwrap_or_default()))
            .capture("n", 1)
            .capture("n", 2);
        assert_eq!(f.captures().len(), 1);
        assert_eq!(f.call(vec![]).unwrap(), vec![Value::Int(2)]);
    }
}
