//! Lazy arithmetic-progression sets
//!
//! An [`Iota`] answers membership, indexing and enumeration from
//! `(first, last, step)` alone and never allocates its elements. Either end
//! may be unbounded; such a range is a valid value but has
//! [`Cardinality::Infinite`] and refuses operations that need every element.
//!
//! A bounded range compares by its elements, so `{1;5}`, `{1;=4}` and
//! `{1, 2, 3, 4}` are all equal. Unbounded ranges compare by how they were
//! written.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use tracing::debug;

use crate::error::{EvalError, Result};
use crate::range::ResolvedRange;
use crate::set::{Cardinality, Set};
use crate::slice::{compute_indices, is_valid_range, range_length, SliceIter};
use crate::value::Value;

/// What a range materializes into, and how it renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IotaKind {
    /// `{start;end}`, materializes to a generic set
    Set,
    /// `[start;end]`, materializes to an array
    Array,
}

/// Which path an update on a lazy range takes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// The range already satisfies the update
    Unchanged,
    /// The result is still a pure progression (or empty)
    Lazy(Set),
    /// The range has to be materialized first
    Materialize,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Iota {
    bounds: ResolvedRange,
    kind: IotaKind,
    first: Option<i64>,
    last: Option<i64>,
    len: Cardinality,
}

impl Iota {
    /// Build the range described by `range`
    ///
    /// A zero step is an error. A range with no elements is not: it yields the
    /// canonical empty set.
    pub fn new(range: &ResolvedRange, kind: IotaKind) -> Result<Set> {
        let step = range.step;
        if step == 0 {
            return Err(EvalError::InvalidRange(format!(
                "range step must not be zero in {}",
                range
            )));
        }
        let sign = step.signum();

        // Absent bounds stay absent; an inclusive finite end moves out one unit.
        let end = match range.end {
            Some(end) if range.inclusive => Some(end.checked_add(sign).ok_or_else(|| {
                EvalError::InvalidRange(format!("range end overflows in {}", range))
            })?),
            end => end,
        };

        let (first, last) = match (range.start, end) {
            (Some(start), Some(end)) => {
                if !is_valid_range(start, end, step) {
                    return Ok(Set::empty());
                }
                let len = range_length(start, end, step);
                let last = start as i128 + step as i128 * (len as i128 - 1);
                (Some(start), Some(last as i64))
            }
            (start, Some(end)) => match end.checked_sub(sign) {
                Some(last) => (start, Some(last)),
                None => return Ok(Set::empty()),
            },
            (start, None) => (start, None),
        };

        Ok(Set::Iota(Iota {
            bounds: ResolvedRange {
                inclusive: range.inclusive && range.end.is_some(),
                ..*range
            },
            kind,
            first,
            last,
            len: progression_len(first, last, step),
        }))
    }

    /// A progression from `first` to `last` inclusive, rendered that way
    fn from_parts(first: Option<i64>, last: Option<i64>, step: i64, kind: IotaKind) -> Set {
        if let (Some(f), Some(l)) = (first, last) {
            if (l as i128 - f as i128) * (step.signum() as i128) < 0 {
                return Set::empty();
            }
        }
        Set::Iota(Iota {
            bounds: ResolvedRange::new(first, last, step, last.is_some()),
            kind,
            first,
            last,
            len: progression_len(first, last, step),
        })
    }

    pub fn bounds(&self) -> &ResolvedRange {
        &self.bounds
    }

    pub fn kind(&self) -> IotaKind {
        self.kind
    }

    pub fn step(&self) -> i64 {
        self.bounds.step
    }

    /// First element in enumeration order, if the range has a start
    pub fn first(&self) -> Option<i64> {
        self.first
    }

    /// Last element in enumeration order, if the range has an end
    pub fn last(&self) -> Option<i64> {
        self.last
    }

    pub fn count(&self) -> Cardinality {
        self.len
    }

    pub fn is_bounded(&self) -> bool {
        matches!(self.len, Cardinality::Finite(_))
    }

    pub fn has(&self, value: &Value) -> bool {
        let Some(v) = value.to_int() else {
            return false;
        };
        let v = v as i128;
        let step = self.step() as i128;
        let anchor = self.first.or(self.last).unwrap_or(0) as i128;
        if (v - anchor) % step != 0 {
            return false;
        }
        let after_first = self.first.map_or(true, |f| (v - f as i128) * step.signum() >= 0);
        let before_last = self.last.map_or(true, |l| (l as i128 - v) * step.signum() >= 0);
        after_first && before_last
    }

    /// Element at position `index`
    pub fn call(&self, index: i64) -> Result<Value> {
        let out_of_bounds = || EvalError::IndexOutOfBounds {
            index,
            length: self.len,
        };
        if index < 0 {
            return Err(out_of_bounds());
        }
        if let Cardinality::Finite(n) = self.len {
            if index as u64 >= n {
                return Err(out_of_bounds());
            }
        }
        let first = self
            .first
            .ok_or_else(|| EvalError::unbounded("index into", self))?;
        let value = first as i128 + self.step() as i128 * index as i128;
        i64::try_from(value)
            .map(Value::from)
            .map_err(|_| out_of_bounds())
    }

    /// Fresh enumerator over the elements in order
    ///
    /// Fails for a range without a start. A range without an end enumerates
    /// forever; check [`Iota::count`] before collecting.
    pub fn iter(&self) -> Result<IotaIter> {
        let first = self
            .first
            .ok_or_else(|| EvalError::unbounded("enumerate", self))?;
        Ok(IotaIter {
            next: first as i128,
            step: self.step() as i128,
            remaining: match self.len {
                Cardinality::Finite(n) => Some(n),
                Cardinality::Infinite => None,
            },
        })
    }

    /// Elements of a bounded range in comparison order
    ///
    /// Set ranges ascend whatever their step; array ranges keep enumeration
    /// order.
    pub(crate) fn ordered_iter(&self) -> Option<IotaIter> {
        let (Some(first), Some(last)) = (self.first, self.last) else {
            return None;
        };
        let step = self.step() as i128;
        let (next, step) = if self.kind == IotaKind::Set && step < 0 {
            (last as i128, -step)
        } else {
            (first as i128, step)
        };
        Some(IotaIter {
            next,
            step,
            remaining: self.len.finite(),
        })
    }

    /// Compare two ranges by their elements in [`Iota::ordered_iter`] order
    pub(crate) fn cmp_elements(&self, other: &Iota) -> Ordering {
        match (self.ordered_iter(), other.ordered_iter()) {
            // One progression is a prefix of the other
            (Some(a), Some(b)) if a.next == b.next && a.step == b.step => {
                a.remaining.cmp(&b.remaining)
            }
            (Some(a), Some(b)) => a.map(Value::from).cmp(b.map(Value::from)),
            _ => self.cmp(other),
        }
    }

    /// Every element, for callers that need them all
    pub fn materialize(&self) -> Result<Vec<Value>> {
        match (self.first, self.last) {
            (Some(first), Some(last)) => {
                debug!(count = %self.len, "materializing lazy range {}", self);
                Ok(compute_indices(first, last, self.step(), true)
                    .into_iter()
                    .map(Value::from)
                    .collect())
            }
            _ => Err(EvalError::unbounded("materialize", self)),
        }
    }

    /// Materialize into the set representation matching [`Iota::kind`]
    pub fn to_eager(&self) -> Result<Set> {
        let values = self.materialize()?;
        Ok(match self.kind {
            IotaKind::Set => Set::from_values(values),
            IotaKind::Array => Set::array(values),
        })
    }

    /// How adding `value` can be done
    ///
    /// Adding the element just past either end keeps the range lazy.
    pub fn plan_with(&self, value: &Value) -> Update {
        if self.has(value) {
            return Update::Unchanged;
        }
        let Some(v) = value.to_int() else {
            return Update::Materialize;
        };
        let step = self.step();
        if self.last.is_some_and(|l| l as i128 + step as i128 == v as i128) {
            return Update::Lazy(Self::from_parts(self.first, Some(v), step, self.kind));
        }
        if self.first.is_some_and(|f| f as i128 - step as i128 == v as i128) {
            return Update::Lazy(Self::from_parts(Some(v), self.last, step, self.kind));
        }
        Update::Materialize
    }

    /// How removing `value` can be done
    ///
    /// Dropping the first or last element keeps the range lazy.
    pub fn plan_without(&self, value: &Value) -> Update {
        if !self.has(value) {
            return Update::Unchanged;
        }
        let Some(v) = value.to_int() else {
            return Update::Materialize;
        };
        if self.len == Cardinality::Finite(1) {
            return Update::Lazy(Set::empty());
        }
        let step = self.step();
        if self.first == Some(v) {
            if let Some(next) = v.checked_add(step) {
                return Update::Lazy(Self::from_parts(Some(next), self.last, step, self.kind));
            }
        }
        if self.last == Some(v) {
            if let Some(prev) = v.checked_sub(step) {
                return Update::Lazy(Self::from_parts(self.first, Some(prev), step, self.kind));
            }
        }
        Update::Materialize
    }

    /// The sub-range selected by a resolved slice; stays lazy
    pub fn slice(&self, selection: &SliceIter) -> Result<Set> {
        let count = selection.len();
        if count == 0 {
            return Ok(Set::empty());
        }
        if selection.start() == 0
            && selection.increment() == 1
            && self.len == Cardinality::Finite(count)
        {
            return Ok(Set::Iota(self.clone()));
        }
        let first = self
            .first
            .ok_or_else(|| EvalError::unbounded("slice", self))?;
        let step = self.step() as i128 * selection.increment() as i128;
        let first = first as i128 + self.step() as i128 * selection.start() as i128;
        let last = first + step * (count as i128 - 1);
        let step = i64::try_from(step)
            .map_err(|_| EvalError::InvalidRange(format!("slice step overflows for {}", self)))?;
        Ok(Self::from_parts(
            Some(first as i64),
            Some(last as i64),
            step,
            self.kind,
        ))
    }
}

fn progression_len(first: Option<i64>, last: Option<i64>, step: i64) -> Cardinality {
    match (first, last) {
        (Some(f), Some(l)) => {
            let span = (l as i128 - f as i128).unsigned_abs();
            let steps = u64::try_from(span / (step as i128).unsigned_abs()).unwrap_or(u64::MAX);
            Cardinality::Finite(steps.saturating_add(1))
        }
        _ => Cardinality::Infinite,
    }
}

impl fmt::Display for Iota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            IotaKind::Set => write!(f, "{{{}}}", self.bounds),
            IotaKind::Array => write!(f, "[{}]", self.bounds),
        }
    }
}

/// Enumerator over a lazy range; single-use
#[derive(Debug, Clone)]
pub struct IotaIter {
    next: i128,
    step: i128,
    remaining: Option<u64>,
}

impl Iterator for IotaIter {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }
        let current = i64::try_from(self.next).ok()?;
        self.next += self.step;
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.remaining {
            Some(n) => {
                let n = usize::try_from(n).unwrap_or(usize::MAX);
                (n, Some(n))
            }
            None => (usize::MAX, None),
        }
    }
}
