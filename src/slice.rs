//! Index and slice arithmetic
//!
//! Pure functions turning `(start, end, step, inclusive)` into concrete index
//! sequences, and the cursor used to slice a collection of known length.
//! Both the lazy range value and the slice resolver build on these.

use std::fmt;
use tracing::debug;

use crate::ast::Expression;
use crate::error::{EvalError, Result};
use crate::evaluator::Eval;
use crate::range::{RangeExpr, ResolvedRange};
use crate::scope::Scope;
use crate::value::Value;

/// `step` is non-zero and points from `start` toward `end`
pub fn is_valid_range(start: i64, end: i64, step: i64) -> bool {
    step != 0 && ((start > end && step < 0) || (start < end && step > 0))
}

/// Number of elements in `[start, end)` stepping by `step`; 0 for an invalid range
pub fn range_length(start: i64, end: i64, step: i64) -> u64 {
    if !is_valid_range(start, end, step) {
        return 0;
    }
    let span = (end as i128 - start as i128).unsigned_abs();
    let step = (step as i128).unsigned_abs();
    span.div_ceil(step) as u64
}

/// Map a possibly negative or overflowing index into `[min, max]`
///
/// Negative indexes count back from `max`; anything still below zero
/// clamps to `min` and anything past `max` clamps to `max`.
pub fn resolve_index(i: i64, min: i64, max: i64) -> i64 {
    if i > max {
        max
    } else if i < 0 {
        if i.unsigned_abs() > max.unsigned_abs() {
            min
        } else {
            max + i
        }
    } else {
        i
    }
}

/// The integers from `start` to `end` stepping by `step`
///
/// `end` is excluded unless `inclusive`. Empty when `step` is zero or points
/// away from `end`.
pub fn compute_indices(start: i64, end: i64, step: i64, inclusive: bool) -> Vec<i64> {
    let end = if inclusive {
        end.saturating_add(step.signum())
    } else {
        end
    };
    if !is_valid_range(start, end, step) {
        return Vec::new();
    }
    let length = range_length(start, end, step);
    (0..length)
        .map(|i| (start as i128 + step as i128 * i as i128) as i64)
        .collect()
}

/// Single-pass cursor over the indexes a slice selects
///
/// Call [`SliceIter::move_next`] before reading [`SliceIter::current`]. The
/// cursor cannot be rewound; resolve the slice again to re-traverse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceIter {
    start: i64,
    limit: u64,
    increment: i64,
    cursor: Option<u64>,
}

impl SliceIter {
    /// Resolve `range` against a collection of `len` elements
    ///
    /// Returns `Ok(None)` for an empty collection. A zero step, or bounds that
    /// resolve to different indexes with no valid direction between them, are
    /// errors.
    pub fn new(range: &ResolvedRange, len: u64) -> Result<Option<SliceIter>> {
        let step = range.step;
        if step == 0 {
            return Err(EvalError::InvalidRange(format!(
                "slice step must not be zero in {}",
                range
            )));
        }
        if len == 0 {
            return Ok(None);
        }
        let n = i64::try_from(len)
            .map_err(|_| EvalError::InvalidRange(format!("cannot slice {} elements", len)))?;

        let start = match range.start {
            Some(s) => {
                let index = resolve_index(s, 0, n);
                if index == n && step < 0 {
                    n - 1
                } else {
                    index
                }
            }
            None if step > 0 => 0,
            None => n - 1,
        };
        let end = match range.end {
            Some(e) => resolve_index(e, 0, n),
            None if step > 0 => n,
            None => -1,
        };
        let inclusive = range.inclusive && range.end.is_some();

        if start == end {
            let limit = u64::from(inclusive && start < n);
            return Ok(Some(SliceIter::from_parts(start, limit, step)));
        }
        if !is_valid_range(start, end, step) {
            return Err(EvalError::InvalidRange(format!(
                "slice {} has no valid direction over {} elements",
                range, len
            )));
        }

        let mut end = if inclusive { end + step.signum() } else { end };
        end = if step > 0 { end.min(n) } else { end.max(-1) };
        let limit = range_length(start, end, step);
        debug!(start, limit, step, "resolved slice {}", range);
        Ok(Some(SliceIter::from_parts(start, limit, step)))
    }

    fn from_parts(start: i64, limit: u64, increment: i64) -> Self {
        Self {
            start,
            limit,
            increment,
            cursor: None,
        }
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn increment(&self) -> i64 {
        self.increment
    }

    /// Number of indexes selected
    pub fn len(&self) -> u64 {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.limit == 0
    }

    /// Index under the cursor, `None` before the first move or after the end
    pub fn current(&self) -> Option<i64> {
        match self.cursor {
            Some(c) if c < self.limit => Some(self.index_at(c)),
            _ => None,
        }
    }

    /// Advance the cursor; false once every index has been visited
    pub fn move_next(&mut self) -> bool {
        let next = self.cursor.map_or(0, |c| c.saturating_add(1));
        self.cursor = Some(next.min(self.limit));
        next < self.limit
    }

    /// Index at position `i`, clamped into the selection
    pub fn call_index(&self, i: i64) -> Option<i64> {
        if self.limit == 0 {
            return None;
        }
        let position = (i.max(0) as u64).min(self.limit - 1);
        Some(self.index_at(position))
    }

    fn index_at(&self, position: u64) -> i64 {
        (self.start as i128 + self.increment as i128 * position as i128) as i64
    }
}

impl Iterator for SliceIter {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.move_next() {
            self.current()
        } else {
            None
        }
    }
}

/// `lhs(range)`: the sub-set of `lhs` selected by position
#[derive(Debug, Clone, PartialEq)]
pub struct SliceExpr {
    pub lhs: Box<Expression>,
    pub range: RangeExpr,
}

impl SliceExpr {
    pub fn new(lhs: Expression, range: RangeExpr) -> Self {
        Self {
            lhs: Box::new(lhs),
            range,
        }
    }
}

impl Eval for SliceExpr {
    fn eval(&self, scope: &Scope) -> Result<Value> {
        let target = self.lhs.eval(scope)?;
        let set = target.as_set("slice target")?;
        let range = self.range.resolve(scope)?;
        Ok(Value::Set(set.call_slice(&range)?))
    }
}

impl fmt::Display for SliceExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.lhs, self.range)
    }
}
