//! relset - a relational set-value algebra
//!
//! Values are numbers, strings, tuples, native functions and sets. A set is
//! either a generic set, an array, or a lazy arithmetic range that answers
//! membership, indexing and slicing without materializing its elements.
//! Tuples can be grouped into nested relations with `nest` and flattened
//! again with `unnest`.
//!
//! Expressions are built as [`Expression`] trees and evaluated against a
//! [`Scope`] through the [`Eval`] trait:
//!
//! ```
//! use relset::{Eval, Expression, IotaKind, RangeExpr, Scope, Value};
//!
//! let range = RangeExpr::new(Some(Expression::number(0)), None, Some(Expression::number(3)), false);
//! let expr = Expression::call(Expression::iota(range, IotaKind::Set), Expression::number(4));
//! assert_eq!(expr.eval(&Scope::new()).unwrap(), Value::from(12));
//! ```
//!
//! With the `engine` feature (on by default) an [`engine::Engine`] owns a
//! root value, applies updates to it and notifies observers.

pub mod ast;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod iota;
pub mod nest;
pub mod range;
pub mod scope;
pub mod set;
pub mod slice;
pub mod value;

#[cfg(feature = "engine")]
pub mod engine;

// Re-export commonly used types
pub use ast::Expression;
pub use config::EngineConfig;
pub use error::{format_eval_error, EvalError, Result};
pub use evaluator::Eval;
pub use iota::{Iota, IotaKind};
pub use nest::{nest, relation_attrs, unnest, NestExpr, UnnestExpr};
pub use range::{IotaExpr, RangeExpr, ResolvedRange};
pub use scope::Scope;
pub use set::{Cardinality, Set};
pub use slice::{SliceExpr, SliceIter};
pub use value::{NativeFunction, Names, Tuple, Value, ValueKind};

#[cfg(feature = "engine")]
pub use engine::{Engine, Observation};
#[cfg(feature = "engine")]
pub use error::EngineError;

/// relset version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Evaluate `expr` in a fresh top-level scope holding only the global functions
pub fn evaluate(expr: &Expression) -> Result<Value> {
    expr.eval(&Scope::from_bindings(evaluator::globals()))
}
