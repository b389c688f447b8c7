//! External (application-defined) AMF types
//!
//! Servers sometimes send typed objects whose class only the application
//! understands. A handler registered under the class name receives the
//! decoded properties and returns the value to hand to the caller instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::AmfError;
use super::value::AmfValue;

/// Converts the properties of a typed object into an application value
pub type ExternalHandler =
    Arc<dyn Fn(&str, HashMap<String, AmfValue>) -> Result<AmfValue, AmfError> + Send + Sync>;

/// Shared registry of external handlers, keyed by class name
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone, Default)]
pub struct ExternalHandlers {
    handlers: Arc<RwLock<HashMap<String, ExternalHandler>>>,
}

impl ExternalHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `class_name`
    pub fn register(&self, class_name: impl Into<String>, handler: ExternalHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(class_name.into(), handler);
    }

    pub fn get(&self, class_name: &str) -> Option<ExternalHandler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(class_name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ExternalHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalHandlers")
            .field("registered", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_replace() {
        let handlers = ExternalHandlers::new();
        assert!(handlers.is_empty());

        handlers.register(
            "a.B",
            Arc::new(|_: &str, _: HashMap<String, AmfValue>| {
                Ok::<_, AmfError>(AmfValue::Number(1.0))
            }),
        );
        let shared = handlers.clone();
        shared.register(
            "a.B",
            Arc::new(|_: &str, _: HashMap<String, AmfValue>| {
                Ok::<_, AmfError>(AmfValue::Number(2.0))
            }),
        );

        assert_eq!(handlers.len(), 1);
        let handler = handlers.get("a.B").unwrap();
        assert_eq!(handler("a.B", HashMap::new()).unwrap(), AmfValue::Number(2.0));
        assert!(handlers.get("missing").is_none());
    }
}
