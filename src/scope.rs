//! Name bindings for evaluation
//!
//! A [`Scope`] is persistent: `with` returns a child frame sharing its parent,
//! so binding a name never disturbs scopes other expressions hold.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EvalError, Result};
use crate::value::Value;

#[derive(Debug)]
struct Frame {
    bindings: HashMap<String, Value>,
    parent: Option<Arc<Frame>>,
}

/// Chain of binding frames, innermost first
#[derive(Debug, Clone, Default)]
pub struct Scope {
    frame: Option<Arc<Frame>>,
}

impl Scope {
    /// An empty scope
    pub fn new() -> Self {
        Self::default()
    }

    /// A single frame holding every binding in `bindings`
    pub fn from_bindings<K: Into<String>>(bindings: impl IntoIterator<Item = (K, Value)>) -> Self {
        Scope::new().with_all(bindings)
    }

    /// Child scope with `name` bound to `value`
    pub fn with(&self, name: impl Into<String>, value: Value) -> Self {
        self.with_all([(name.into(), value)])
    }

    /// Child scope with several bindings in one frame
    pub fn with_all<K: Into<String>>(&self, bindings: impl IntoIterator<Item = (K, Value)>) -> Self {
        Scope {
            frame: Some(Arc::new(Frame {
                bindings: bindings.into_iter().map(|(k, v)| (k.into(), v)).collect(),
                parent: self.frame.clone(),
            })),
        }
    }

    /// Innermost binding of `name`
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        let mut frame = self.frame.as_deref();
        while let Some(current) = frame {
            if let Some(value) = current.bindings.get(name) {
                return Some(value);
            }
            frame = current.parent.as_deref();
        }
        None
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        self.lookup(name)
            .ok_or_else(|| EvalError::UndefinedName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowing() {
        let outer = Scope::new().with("x", Value::from(1));
        let inner = outer.with("x", Value::from(2));
        assert_eq!(inner.get("x").unwrap(), &Value::from(2));
        assert_eq!(outer.get("x").unwrap(), &Value::from(1));
    }

    #[test]
    fn test_parent_lookup() {
        let scope = Scope::from_bindings([("a", Value::from(1)), ("b", Value::from(2))])
            .with("c", Value::from(3));
        assert_eq!(scope.lookup("a"), Some(&Value::from(1)));
        assert_eq!(scope.lookup("c"), Some(&Value::from(3)));
    }

    #[test]
    fn test_undefined() {
        let err = Scope::new().get("missing").unwrap_err();
        assert_eq!(err, EvalError::UndefinedName("missing".to_string()));
    }
}
