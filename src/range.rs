//! Range specifications
//!
//! A [`RangeExpr`] is the unevaluated `start;end;step` triple written in source.
//! Resolving it against a scope yields a [`ResolvedRange`] of concrete integer
//! bounds, which either builds a lazy range value or selects a slice.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ast::Expression;
use crate::error::Result;
use crate::evaluator::Eval;
use crate::iota::{Iota, IotaKind};
use crate::scope::Scope;
use crate::value::Value;

/// Unevaluated range bounds; an absent bound extends as far as the step points
#[derive(Debug, Clone, PartialEq)]
pub struct RangeExpr {
    pub start: Option<Box<Expression>>,
    pub end: Option<Box<Expression>>,
    pub step: Option<Box<Expression>>,
    pub inclusive: bool,
}

impl RangeExpr {
    pub fn new(
        start: Option<Expression>,
        end: Option<Expression>,
        step: Option<Expression>,
        inclusive: bool,
    ) -> Self {
        Self {
            start: start.map(Box::new),
            end: end.map(Box::new),
            step: step.map(Box::new),
            inclusive,
        }
    }

    /// Evaluate every present bound; a missing step becomes 1
    ///
    /// Fails on the first bound that errors or is not an integer. Without an
    /// end bound the range is never inclusive.
    pub fn resolve(&self, scope: &Scope) -> Result<ResolvedRange> {
        let start = resolve_bound(self.start.as_deref(), scope, "range start")?;
        let end = resolve_bound(self.end.as_deref(), scope, "range end")?;
        let step = resolve_bound(self.step.as_deref(), scope, "range step")?.unwrap_or(1);
        Ok(ResolvedRange {
            start,
            end,
            step,
            inclusive: self.inclusive && end.is_some(),
        })
    }
}

fn resolve_bound(expr: Option<&Expression>, scope: &Scope, operand: &str) -> Result<Option<i64>> {
    match expr {
        Some(expr) => Ok(Some(expr.eval(scope)?.as_int(operand)?)),
        None => Ok(None),
    }
}

impl fmt::Display for RangeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_range(
            f,
            self.start.as_deref(),
            self.end.as_deref(),
            self.step.as_deref(),
            self.inclusive,
        )
    }
}

/// A range whose bounds have been evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResolvedRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub step: i64,
    pub inclusive: bool,
}

impl ResolvedRange {
    pub fn new(start: Option<i64>, end: Option<i64>, step: i64, inclusive: bool) -> Self {
        Self {
            start,
            end,
            step,
            inclusive,
        }
    }
}

impl fmt::Display for ResolvedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = (self.step != 1).then_some(self.step);
        write_range(f, self.start, self.end, step, self.inclusive)
    }
}

/// Canonical `start;end;step` notation, `;=` marking an inclusive end
fn write_range<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    start: Option<T>,
    end: Option<T>,
    step: Option<T>,
    inclusive: bool,
) -> fmt::Result {
    if let Some(start) = start {
        write!(f, "{}", start)?;
    }
    f.write_str(";")?;
    if let Some(end) = end {
        if inclusive {
            f.write_str("=")?;
        }
        write!(f, "{}", end)?;
    }
    if let Some(step) = step {
        write!(f, ";{}", step)?;
    }
    Ok(())
}

/// Range literal producing a lazy range value: `{start;end}` or `[start;end]`
#[derive(Debug, Clone, PartialEq)]
pub struct IotaExpr {
    pub range: RangeExpr,
    pub kind: IotaKind,
}

impl IotaExpr {
    pub fn new(range: RangeExpr, kind: IotaKind) -> Self {
        Self { range, kind }
    }
}

impl Eval for IotaExpr {
    fn eval(&self, scope: &Scope) -> Result<Value> {
        let range = self.range.resolve(scope)?;
        Ok(Value::Set(Iota::new(&range, self.kind)?))
    }
}

impl fmt::Display for IotaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            IotaKind::Set => write!(f, "{{{}}}", self.range),
            IotaKind::Array => write!(f, "[{}]", self.range),
        }
    }
}
