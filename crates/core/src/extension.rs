//! Tag-keyed handlers for custom values.
//!
//! A handler gives the engine a fast fingerprint path for a custom type (hash
//! its raw backing buffer) and a dedicated codec for persisting it. Custom
//! values without a handler fall back to their generic byte dump.

use crate::error::Result;
use crate::value::{CustomValue, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Fingerprint and codec support for one custom type tag.
pub trait ExtensionHandler: Send + Sync {
    /// The type tag this handler serves.
    fn tag(&self) -> &str;

    /// Raw bytes to hash in place of the generic byte dump.
    ///
    /// Returning `None` defers to the generic fallback.
    fn raw_buffer<'a>(&self, value: &'a dyn CustomValue) -> Option<Cow<'a, [u8]>>;

    /// Encode a value for persistence.
    fn encode(&self, value: &dyn CustomValue) -> Result<Vec<u8>>;

    /// Rebuild a value from its encoded bytes.
    fn decode(&self, bytes: &[u8]) -> Result<Value>;
}

/// Handlers registered by type tag.
#[derive(Default, Clone)]
pub struct ExtensionRegistry {
    handlers: HashMap<String, Arc<dyn ExtensionHandler>>,
}

impl ExtensionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous handler for the same tag.
    pub fn register(&mut self, handler: impl ExtensionHandler + 'static) {
        let tag = handler.tag().to_string();
        tracing::debug!(tag = %tag, "Registered extension handler");
        self.handlers.insert(tag, Arc::new(handler));
    }

    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&Arc<dyn ExtensionHandler>> {
        self.handlers.get(tag)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&String> = self.handlers.keys().collect();
        tags.sort();
        f.debug_struct("ExtensionRegistry")
            .field("tags", &tags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::any::Any;

    #[derive(Debug)]
    struct Grid(Vec<u8>);

    impl CustomValue for Grid {
        fn type_tag(&self) -> &str {
            "grid"
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
            let grid = value.as_any().downcast_ref::<Grid>()?;
            Some(Cow::Borrowed(&grid.0))
        }

        fn encode(&self, value: &dyn CustomValue) -> Result<Vec<u8>> {
            self.raw_buffer(value)
                .map(Cow::into_owned)
                .ok_or_else(|| Error::serialization("not a grid"))
        }

        fn decode(&self, bytes: &[u8]) -> Result<Value> {
            Ok(Value::custom(Grid(bytes.to_vec())))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ExtensionRegistry::new();
        assert!(registry.is_empty());
        registry.register(GridHandler);
        assert_eq!(registry.len(), 1);

        let handler = registry.get("grid").unwrap();
        let encoded = handler.encode(&Grid(vec![4, 5])).unwrap();
        let decoded = handler.decode(&encoded).unwrap();
        assert_eq!(decoded.downcast_custom::<Grid>().unwrap().0, vec![4, 5]);
        assert!(registry.get("table").is_none());
    }
}
