//! Abstract Syntax Tree definitions for relset expressions

use std::fmt;

use crate::iota::IotaKind;
use crate::nest::{NestExpr, UnnestExpr};
use crate::range::{IotaExpr, RangeExpr};
use crate::slice::SliceExpr;
use crate::value::{Names, Value};

/// Expression node; a closed set of variants evaluated by [`crate::Eval`]
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Literal value
    Literal { value: Value },

    /// Variable reference
    Variable { name: String },

    /// Set literal: `{a, b, c}`
    Set { elements: Vec<Expression> },

    /// Array literal: `[a, b, c]`
    Array { elements: Vec<Expression> },

    /// Tuple literal: `(x: 1, y: 2)`
    Tuple { attrs: Vec<(String, Expression)> },

    /// Range literal: `{1;10;2}` or `[1;=5]`
    Iota(IotaExpr),

    /// Positional slice: `s(1;3)`
    Slice(SliceExpr),

    /// Index into a set, or apply a function: `s(0)`, `f(x)`
    Call {
        callee: Box<Expression>,
        arg: Box<Expression>,
    },

    /// `(r nest |a, b| n)`
    Nest(NestExpr),

    /// `(r unnest n)`
    Unnest(UnnestExpr),
}

impl Expression {
    pub fn literal(value: Value) -> Self {
        Expression::Literal { value }
    }

    pub fn number(n: i64) -> Self {
        Self::literal(Value::from(n))
    }

    pub fn number_f(n: f64) -> Self {
        Self::literal(Value::from(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::literal(Value::String(s.into()))
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable { name: name.into() }
    }

    pub fn set(elements: Vec<Expression>) -> Self {
        Expression::Set { elements }
    }

    pub fn array(elements: Vec<Expression>) -> Self {
        Expression::Array { elements }
    }

    pub fn tuple<K: Into<String>>(attrs: impl IntoIterator<Item = (K, Expression)>) -> Self {
        Expression::Tuple {
            attrs: attrs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn iota(range: RangeExpr, kind: IotaKind) -> Self {
        Expression::Iota(IotaExpr::new(range, kind))
    }

    pub fn slice(lhs: Expression, range: RangeExpr) -> Self {
        Expression::Slice(SliceExpr::new(lhs, range))
    }

    pub fn call(callee: Expression, arg: Expression) -> Self {
        Expression::Call {
            callee: Box::new(callee),
            arg: Box::new(arg),
        }
    }

    pub fn nest<'a>(
        lhs: Expression,
        attrs: impl IntoIterator<Item = &'a str>,
        attr: impl Into<String>,
        inverse: bool,
    ) -> Self {
        let attrs: Names = attrs.into_iter().map(str::to_string).collect();
        Expression::Nest(NestExpr::new(lhs, attrs, attr, inverse))
    }

    pub fn unnest(lhs: Expression, attr: impl Into<String>) -> Self {
        Expression::Unnest(UnnestExpr::new(lhs, attr))
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal { value } => write!(f, "{}", value),
            Expression::Variable { name } => f.write_str(name),
            Expression::Set { elements } => {
                f.write_str("{")?;
                write_list(f, elements)?;
                f.write_str("}")
            }
            Expression::Array { elements } => {
                f.write_str("[")?;
                write_list(f, elements)?;
                f.write_str("]")
            }
            Expression::Tuple { attrs } => {
                f.write_str("(")?;
                for (i, (name, expr)) in attrs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", name, expr)?;
                }
                f.write_str(")")
            }
            Expression::Iota(expr) => write!(f, "{}", expr),
            Expression::Slice(expr) => write!(f, "{}", expr),
            Expression::Call { callee, arg } => write!(f, "{}({})", callee, arg),
            Expression::Nest(expr) => write!(f, "{}", expr),
            Expression::Unnest(expr) => write!(f, "{}", expr),
        }
    }
}
