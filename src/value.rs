//! Runtime values
//!
//! Every evaluation produces a [`Value`]. Values are immutable once built and
//! carry a total order, structural equality, a stable hash and a truthiness
//! coercion so they can live inside sets and be compared across kinds.

use serde::ser::{Error as _, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{EvalError, Result};
use crate::set::Set;

/// Attribute names of a tuple or relation
pub type Names = BTreeSet<String>;

/// Major kind of a value; values of different kinds order by kind first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueKind {
    Number,
    String,
    Tuple,
    Set,
    Function,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Number => write!(f, "number"),
            ValueKind::String => write!(f, "string"),
            ValueKind::Tuple => write!(f, "tuple"),
            ValueKind::Set => write!(f, "set"),
            ValueKind::Function => write!(f, "function"),
        }
    }
}

/// Value representation (runtime values)
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    String(String),
    Tuple(Tuple),
    Set(Set),
    Function(NativeFunction),
}

impl Value {
    /// Build a number, folding negative zero into zero
    pub fn number(n: f64) -> Self {
        if n == 0.0 {
            Value::Number(0.0)
        } else {
            Value::Number(n)
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Tuple(_) => ValueKind::Tuple,
            Value::Set(_) => ValueKind::Set,
            Value::Function(_) => ValueKind::Function,
        }
    }

    /// Truthiness: zero, empty strings, empty tuples and empty sets are false
    pub fn is_true(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::Set(s) => !s.is_empty(),
            Value::Function(_) => true,
        }
    }

    /// The value as an integer, for range bounds, steps and indexes
    ///
    /// `operand` names the thing being converted so a mismatch can say which
    /// bound was wrong.
    pub fn as_int(&self, operand: &str) -> Result<i64> {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.2e18 => Ok(*n as i64),
            Value::Number(_) => Err(EvalError::type_mismatch(operand, "integer", self)),
            _ => Err(EvalError::type_mismatch(operand, "number", self)),
        }
    }

    /// Integer view used by membership tests; never fails
    pub fn to_int(&self) -> Option<i64> {
        self.as_int("").ok()
    }

    pub fn as_set(&self, operand: &str) -> Result<&Set> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(EvalError::type_mismatch(operand, "set", self)),
        }
    }

    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Value::Tuple(t) => Some(t),
            _ => None,
        }
    }

    /// Convert to a JSON value
    ///
    /// Unbounded lazy ranges cannot be exported.
    pub fn export(&self) -> Result<serde_json::Value> {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.2e18 {
                    Ok(serde_json::Value::from(*n as i64))
                } else {
                    Ok(serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null))
                }
            }
            Value::String(s) => Ok(serde_json::Value::String(s.clone())),
            Value::Tuple(t) => {
                let mut map = serde_json::Map::new();
                for (name, value) in t.iter() {
                    map.insert(name.clone(), value.export()?);
                }
                Ok(serde_json::Value::Object(map))
            }
            Value::Set(s) => {
                let items = s
                    .materialize()?
                    .iter()
                    .map(|v| v.export())
                    .collect::<Result<Vec<_>>>()?;
                Ok(serde_json::Value::Array(items))
            }
            Value::Function(f) => Ok(serde_json::Value::String(f.name().to_string())),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Tuple(a), Value::Tuple(b)) => a.cmp(b),
            (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::Function(a), Value::Function(b)) => a.cmp(b),
            _ => self.kind().cmp(&other.kind()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Value::Number(n) => n.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Tuple(t) => t.hash(state),
            Value::Set(s) => s.hash(state),
            Value::Function(f) => f.name().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{:?}", s),
            Value::Tuple(t) => write!(f, "{}", t),
            Value::Set(s) => write!(f, "{}", s),
            Value::Function(func) => write!(f, "{}", func.name()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.export()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::number(n as f64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Set> for Value {
    fn from(s: Set) -> Self {
        Value::Set(s)
    }
}

impl From<Tuple> for Value {
    fn from(t: Tuple) -> Self {
        Value::Tuple(t)
    }
}

/// A record of named attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tuple(BTreeMap<String, Value>);

impl Tuple {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn names(&self) -> Names {
        self.0.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Copy of this tuple with `name` bound to `value`
    pub fn with(&self, name: impl Into<String>, value: Value) -> Self {
        let mut attrs = self.0.clone();
        attrs.insert(name.into(), value);
        Tuple(attrs)
    }

    /// Copy of this tuple without `name`
    pub fn without(&self, name: &str) -> Self {
        let mut attrs = self.0.clone();
        attrs.remove(name);
        Tuple(attrs)
    }

    /// Keep only the attributes in `names`
    pub fn project(&self, names: &Names) -> Self {
        Tuple(
            self.0
                .iter()
                .filter(|(k, _)| names.contains(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Union of two tuples' attributes; `other` wins on a clash
    pub fn merge(&self, other: &Tuple) -> Self {
        let mut attrs = self.0.clone();
        attrs.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Tuple(attrs)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Tuple {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Tuple(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attrs: Vec<_> = self
            .0
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();
        write!(f, "({})", attrs.join(", "))
    }
}

/// Host function exposed as a value
#[derive(Clone)]
pub struct NativeFunction {
    name: String,
    func: Arc<dyn Fn(&Value) -> Value + Send + Sync>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, arg: &Value) -> Value {
        (self.func)(arg)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.func) as *const () as usize
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// Functions are equal only to themselves.
impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl Eq for NativeFunction {}

impl PartialOrd for NativeFunction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NativeFunction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.addr().cmp(&other.addr()))
    }
}
