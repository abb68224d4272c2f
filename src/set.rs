//! Set values and their representations
//!
//! [`Set`] is a closed sum over the concrete representations. Each arm answers
//! the same contract (count, membership, enumeration, update, positional
//! access, slicing) so callers never need to know which one they hold.
//!
//! Enumerators borrow the set and are single-use: ask for a fresh one to walk
//! the set again, and do not share one between threads without external
//! synchronization.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{btree_set, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::debug;

use crate::error::{EvalError, Result};
use crate::iota::{Iota, IotaIter, IotaKind, Update};
use crate::range::ResolvedRange;
use crate::slice::SliceIter;
use crate::value::Value;

/// Number of elements in a set
///
/// `Infinite` orders after every finite count and never equals one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    Finite(u64),
    Infinite,
}

impl Cardinality {
    pub fn is_finite(&self) -> bool {
        matches!(self, Cardinality::Finite(_))
    }

    pub fn finite(self) -> Option<u64> {
        match self {
            Cardinality::Finite(n) => Some(n),
            Cardinality::Infinite => None,
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::Finite(n) => write!(f, "{}", n),
            Cardinality::Infinite => write!(f, "infinite"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Set {
    /// Unordered elements, kept in value order
    Generic(BTreeSet<Value>),
    /// Elements by position
    Array(Vec<Value>),
    /// Lazy arithmetic progression
    Iota(Iota),
}

impl Set {
    /// The canonical empty set
    pub fn empty() -> Self {
        Set::Generic(BTreeSet::new())
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Set::Generic(values.into_iter().collect())
    }

    /// An array, or the empty set when there are no items
    pub fn array(items: Vec<Value>) -> Self {
        if items.is_empty() {
            Set::empty()
        } else {
            Set::Array(items)
        }
    }

    /// Comparison family: bounded ranges sit with the representation they
    /// materialize into, unbounded ones after everything else
    fn rank(&self) -> u8 {
        match self {
            Set::Generic(_) => 0,
            Set::Array(_) => 1,
            Set::Iota(it) if !it.is_bounded() => 2,
            Set::Iota(it) => match it.kind() {
                IotaKind::Set => 0,
                IotaKind::Array => 1,
            },
        }
    }

    /// Elements in value order for sets, position order for arrays
    fn ordered(&self) -> Enumerator<'_> {
        match self {
            Set::Generic(items) => Enumerator::Generic(items.iter()),
            Set::Array(items) => Enumerator::Array(items.iter()),
            Set::Iota(it) => match it.ordered_iter() {
                Some(iter) => Enumerator::Iota(iter),
                None => Enumerator::Array(<&[Value]>::default().iter()),
            },
        }
    }

    pub fn count(&self) -> Cardinality {
        match self {
            Set::Generic(items) => Cardinality::Finite(items.len() as u64),
            Set::Array(items) => Cardinality::Finite(items.len() as u64),
            Set::Iota(it) => it.count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == Cardinality::Finite(0)
    }

    pub fn has(&self, value: &Value) -> bool {
        match self {
            Set::Generic(items) => items.contains(value),
            Set::Array(items) => items.contains(value),
            Set::Iota(it) => it.has(value),
        }
    }

    /// Fresh enumerator over the elements
    pub fn enumerate(&self) -> Result<Enumerator<'_>> {
        Ok(match self {
            Set::Generic(items) => Enumerator::Generic(items.iter()),
            Set::Array(items) => Enumerator::Array(items.iter()),
            Set::Iota(it) => Enumerator::Iota(it.iter()?),
        })
    }

    /// Enumerator that also reports offsets, for ordered representations
    pub fn array_enumerator(&self) -> Result<Option<ArrayEnumerator<'_>>> {
        match self {
            Set::Generic(_) => Ok(None),
            Set::Array(_) | Set::Iota(_) => Ok(Some(ArrayEnumerator {
                inner: self.enumerate()?,
                offset: 0,
            })),
        }
    }

    /// All elements; fails for an unbounded range
    pub fn materialize(&self) -> Result<Vec<Value>> {
        match self {
            Set::Generic(items) => Ok(items.iter().cloned().collect()),
            Set::Array(items) => Ok(items.clone()),
            Set::Iota(it) => it.materialize(),
        }
    }

    pub fn with(&self, value: Value) -> Result<Set> {
        match self {
            Set::Generic(items) => {
                let mut items = items.clone();
                items.insert(value);
                Ok(Set::Generic(items))
            }
            Set::Array(items) => {
                if items.contains(&value) {
                    return Ok(self.clone());
                }
                let mut items = items.clone();
                items.push(value);
                Ok(Set::Array(items))
            }
            Set::Iota(it) => match it.plan_with(&value) {
                Update::Unchanged => Ok(self.clone()),
                Update::Lazy(set) => Ok(set),
                Update::Materialize => it.to_eager()?.with(value),
            },
        }
    }

    pub fn without(&self, value: &Value) -> Result<Set> {
        match self {
            Set::Generic(items) => {
                let mut items = items.clone();
                items.remove(value);
                Ok(Set::Generic(items))
            }
            Set::Array(items) => Ok(Set::array(
                items.iter().filter(|v| *v != value).cloned().collect(),
            )),
            Set::Iota(it) => match it.plan_without(value) {
                Update::Unchanged => Ok(self.clone()),
                Update::Lazy(set) => Ok(set),
                Update::Materialize => it.to_eager()?.without(value),
            },
        }
    }

    /// Apply `f` to every element; a lazy range is materialized first
    pub fn map<F>(&self, mut f: F) -> Result<Set>
    where
        F: FnMut(&Value) -> Result<Value>,
    {
        match self {
            Set::Generic(items) => Ok(Set::Generic(
                items.iter().map(&mut f).collect::<Result<_>>()?,
            )),
            Set::Array(items) => Ok(Set::array(
                items.iter().map(&mut f).collect::<Result<_>>()?,
            )),
            Set::Iota(it) => it.to_eager()?.map(f),
        }
    }

    /// Keep the elements `pred` accepts; a lazy range is materialized first
    pub fn filter<P>(&self, mut pred: P) -> Result<Set>
    where
        P: FnMut(&Value) -> Result<bool>,
    {
        match self {
            Set::Generic(items) => {
                let mut kept = BTreeSet::new();
                for item in items {
                    if pred(item)? {
                        kept.insert(item.clone());
                    }
                }
                Ok(Set::Generic(kept))
            }
            Set::Array(items) => {
                let mut kept = Vec::new();
                for item in items {
                    if pred(item)? {
                        kept.push(item.clone());
                    }
                }
                Ok(Set::array(kept))
            }
            Set::Iota(it) => it.to_eager()?.filter(pred),
        }
    }

    /// Element at position `index`
    ///
    /// Generic sets are indexed in value order.
    pub fn call(&self, index: i64) -> Result<Value> {
        let found = match self {
            Set::Iota(it) => return it.call(index),
            Set::Generic(items) => usize::try_from(index)
                .ok()
                .and_then(|i| items.iter().nth(i)),
            Set::Array(items) => usize::try_from(index).ok().and_then(|i| items.get(i)),
        };
        found.cloned().ok_or(EvalError::IndexOutOfBounds {
            index,
            length: self.count(),
        })
    }

    /// The sub-set selected by a slice over this set's positions
    pub fn call_slice(&self, range: &ResolvedRange) -> Result<Set> {
        let Cardinality::Finite(len) = self.count() else {
            return Err(EvalError::unbounded("slice", self));
        };
        let Some(selection) = SliceIter::new(range, len)? else {
            return Ok(Set::empty());
        };
        debug!(count = selection.len(), "slicing {} with {}", self, range);
        match self {
            Set::Iota(it) => it.slice(&selection),
            Set::Array(items) => Ok(Set::array(
                selection.map(|i| items[i as usize].clone()).collect(),
            )),
            Set::Generic(items) => {
                let ordered: Vec<&Value> = items.iter().collect();
                Ok(Set::from_values(
                    selection.map(|i| ordered[i as usize].clone()),
                ))
            }
        }
    }
}

impl PartialEq for Set {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Set {}

impl PartialOrd for Set {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Set {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank = self.rank();
        rank.cmp(&other.rank()).then_with(|| match (self, other) {
            (Set::Generic(a), Set::Generic(b)) => a.iter().cmp(b.iter()),
            (Set::Array(a), Set::Array(b)) => a.cmp(b),
            (Set::Iota(a), Set::Iota(b)) if rank == 2 => a.cmp(b),
            (Set::Iota(a), Set::Iota(b)) => a.cmp_elements(b),
            _ => self.ordered().cmp(other.ordered()),
        })
    }
}

// Equal sets share rank, count and first ordered element.
impl Hash for Set {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Set::Iota(it) if !it.is_bounded() => it.hash(state),
            _ => {
                self.count().hash(state);
                self.ordered().next().hash(state);
            }
        }
    }
}

impl fmt::Display for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Set::Generic(items) => {
                let items: Vec<_> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{{{}}}", items.join(", "))
            }
            Set::Array(items) => {
                let items: Vec<_> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Set::Iota(it) => write!(f, "{}", it),
        }
    }
}

/// Lazy sequence of a set's elements
pub enum Enumerator<'a> {
    Generic(btree_set::Iter<'a, Value>),
    Array(std::slice::Iter<'a, Value>),
    Iota(IotaIter),
}

impl Iterator for Enumerator<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            Enumerator::Generic(it) => it.next().cloned(),
            Enumerator::Array(it) => it.next().cloned(),
            Enumerator::Iota(it) => it.next().map(Value::from),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Enumerator::Generic(it) => it.size_hint(),
            Enumerator::Array(it) => it.size_hint(),
            Enumerator::Iota(it) => it.size_hint(),
        }
    }
}

/// Enumerator yielding `(offset, element)` pairs
pub struct ArrayEnumerator<'a> {
    inner: Enumerator<'a>,
    offset: i64,
}

impl Iterator for ArrayEnumerator<'_> {
    type Item = (i64, Value);

    fn next(&mut self) -> Option<(i64, Value)> {
        let value = self.inner.next()?;
        let offset = self.offset;
        self.offset += 1;
        Some((offset, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(set: &Set) -> u64 {
        let mut hasher = DefaultHasher::new();
        set.hash(&mut hasher);
        hasher.finish()
    }

    fn nums(ns: &[i64]) -> Vec<Value> {
        ns.iter().map(|n| Value::from(*n)).collect()
    }

    fn iota(start: Option<i64>, end: Option<i64>, step: i64, inclusive: bool) -> Set {
        Iota::new(&ResolvedRange::new(start, end, step, inclusive), IotaKind::Set).unwrap()
    }

    fn slice(set: &Set, start: Option<i64>, end: Option<i64>, step: i64) -> Result<Set> {
        set.call_slice(&ResolvedRange::new(start, end, step, false))
    }

    #[test]
    fn test_empty_normalization() {
        assert_eq!(Set::array(vec![]), Set::empty());
        assert!(Set::empty().is_empty());
        assert_eq!(Set::empty().to_string(), "{}");
    }

    #[test]
    fn test_generic_ops() {
        let set = Set::from_values(nums(&[3, 1, 2]));
        assert_eq!(set.to_string(), "{1, 2, 3}");
        assert_eq!(set.count(), Cardinality::Finite(3));
        assert!(set.has(&Value::from(2)));
        assert_eq!(set.with(Value::from(4)).unwrap().count(), Cardinality::Finite(4));
        assert_eq!(set.with(Value::from(1)).unwrap(), set);
        assert_eq!(
            set.without(&Value::from(2)).unwrap(),
            Set::from_values(nums(&[1, 3]))
        );
        assert_eq!(set.call(0).unwrap(), Value::from(1));
    }

    #[test]
    fn test_array_ops() {
        let arr = Set::array(nums(&[5, 6, 5]));
        assert_eq!(arr.to_string(), "[5, 6, 5]");
        assert_eq!(arr.with(Value::from(6)).unwrap(), arr);
        assert_eq!(arr.with(Value::from(7)).unwrap(), Set::array(nums(&[5, 6, 5, 7])));
        assert_eq!(arr.without(&Value::from(5)).unwrap(), Set::array(nums(&[6])));
        assert_eq!(arr.call(2).unwrap(), Value::from(5));
        assert!(matches!(
            arr.call(3),
            Err(EvalError::IndexOutOfBounds { index: 3, .. })
        ));
        assert_ne!(arr, Set::from_values(nums(&[5, 6])));
    }

    #[test]
    fn test_enumerators_restart() {
        let set = iota(Some(1), Some(4), 1, false);
        let first: Vec<Value> = set.enumerate().unwrap().collect();
        let second: Vec<Value> = set.enumerate().unwrap().collect();
        assert_eq!(first, nums(&[1, 2, 3]));
        assert_eq!(first, second);
    }

    #[test]
    fn test_array_enumerator() {
        let arr = Set::array(nums(&[7, 8]));
        let pairs: Vec<_> = arr.array_enumerator().unwrap().unwrap().collect();
        assert_eq!(pairs, vec![(0, Value::from(7)), (1, Value::from(8))]);
        assert!(Set::from_values(nums(&[1])).array_enumerator().unwrap().is_none());
        let offsets: Vec<i64> = iota(Some(10), Some(13), 1, false)
            .array_enumerator()
            .unwrap()
            .unwrap()
            .map(|(i, _)| i)
            .collect();
        assert_eq!(offsets, vec![0, 1, 2]);
    }

    #[test]
    fn test_iota_updates_downgrade() {
        let range = iota(Some(1), Some(5), 1, false);
        let grown = range.with(Value::from(5)).unwrap();
        assert!(matches!(grown, Set::Iota(_)));

        let gapped = range.with(Value::from(10)).unwrap();
        assert_eq!(gapped, Set::from_values(nums(&[1, 2, 3, 4, 10])));

        let holed = range.without(&Value::from(2)).unwrap();
        assert_eq!(holed, Set::from_values(nums(&[1, 3, 4])));

        let unbounded = iota(Some(0), None, 1, false);
        assert!(matches!(
            unbounded.with(Value::from(-5)),
            Err(EvalError::Unbounded { .. })
        ));
        assert!(matches!(unbounded.with(Value::from(-1)), Ok(Set::Iota(_))));
    }

    #[test]
    fn test_map_and_filter() {
        let range = iota(Some(1), Some(4), 1, false);
        let doubled = range
            .map(|v| Ok(Value::from(v.as_int("x")? * 2)))
            .unwrap();
        assert_eq!(doubled, Set::from_values(nums(&[2, 4, 6])));
        let odd = range
            .filter(|v| Ok(v.as_int("x")? % 2 == 1))
            .unwrap();
        assert_eq!(odd, Set::from_values(nums(&[1, 3])));

        let arr = Set::array(nums(&[1, 2]));
        let none = arr.filter(|_| Ok(false)).unwrap();
        assert_eq!(none, Set::empty());
    }

    #[test]
    fn test_call_slice_array() {
        let arr = Set::array(nums(&[10, 11, 12, 13, 14]));
        assert_eq!(slice(&arr, Some(1), Some(3), 1).unwrap(), Set::array(nums(&[11, 12])));
        assert_eq!(slice(&arr, None, None, -2).unwrap(), Set::array(nums(&[14, 12, 10])));
        assert_eq!(slice(&arr, Some(-1), None, 1).unwrap(), Set::array(nums(&[14])));
        assert_eq!(slice(&arr, Some(0), Some(5), 1).unwrap(), arr);
    }

    #[test]
    fn test_call_slice_generic() {
        let set = Set::from_values(nums(&[4, 2, 8, 6]));
        assert_eq!(slice(&set, Some(1), Some(3), 1).unwrap(), Set::from_values(nums(&[4, 6])));
        assert_eq!(slice(&set, Some(0), Some(4), 1).unwrap(), set);
        assert_eq!(slice(&Set::empty(), Some(0), Some(4), 1).unwrap(), Set::empty());
    }

    #[test]
    fn test_call_slice_iota_stays_lazy() {
        let range = iota(Some(0), Some(20), 2, false);
        let sub = slice(&range, Some(1), Some(4), 1).unwrap();
        assert!(matches!(sub, Set::Iota(_)));
        assert_eq!(sub.materialize().unwrap(), nums(&[2, 4, 6]));

        let stepped = slice(&range, None, None, 3).unwrap();
        assert_eq!(stepped.materialize().unwrap(), nums(&[0, 6, 12, 18]));

        let reversed = slice(&range, None, None, -1).unwrap();
        assert_eq!(reversed.call(0).unwrap(), Value::from(18));

        assert_eq!(slice(&range, Some(0), Some(10), 1).unwrap(), range);
    }

    #[test]
    fn test_call_slice_errors() {
        let arr = Set::array(nums(&[1, 2, 3]));
        assert!(matches!(
            slice(&arr, Some(0), Some(2), 0),
            Err(EvalError::InvalidRange(_))
        ));
        let unbounded = iota(Some(0), None, 1, false);
        assert!(matches!(
            slice(&unbounded, Some(0), Some(2), 1),
            Err(EvalError::Unbounded { .. })
        ));
    }

    #[test]
    fn test_range_equals_generic_with_same_elements() {
        let range = iota(Some(1), Some(4), 1, false);
        let generic = Set::from_values(nums(&[1, 2, 3]));
        assert_eq!(range, generic);
        assert_eq!(hash_of(&range), hash_of(&generic));

        let round_trip = range.with(Value::from(10)).unwrap().without(&Value::from(10)).unwrap();
        assert!(matches!(round_trip, Set::Generic(_)));
        assert_eq!(round_trip, range);

        let both: BTreeSet<Value> = [Value::Set(range.clone()), Value::Set(generic.clone())].into();
        assert_eq!(both.len(), 1);
        let hashed: HashSet<Value> = [Value::Set(range.clone()), Value::Set(generic)].into();
        assert_eq!(hashed.len(), 1);

        // Descending set ranges hold the same elements
        assert_eq!(iota(Some(3), Some(0), -1, false), range);
        assert!(range < Set::from_values(nums(&[1, 2, 4])));
        assert!(range > Set::from_values(nums(&[1, 2])));
        assert_ne!(range, Set::array(nums(&[1, 2, 3])));
    }

    #[test]
    fn test_array_range_equals_array() {
        let range =
            Iota::new(&ResolvedRange::new(Some(3), Some(0), -1, false), IotaKind::Array).unwrap();
        let arr = Set::array(nums(&[3, 2, 1]));
        assert_eq!(range, arr);
        assert_eq!(hash_of(&range), hash_of(&arr));
        assert_ne!(range, Set::array(nums(&[1, 2, 3])));
        assert_ne!(range, Set::from_values(nums(&[1, 2, 3])));
        assert_eq!(range.without(&Value::from(2)).unwrap(), Set::array(nums(&[3, 1])));
    }

    #[test]
    fn test_unbounded_range_order() {
        let unbounded = iota(Some(0), None, 1, false);
        assert_eq!(unbounded, iota(Some(0), None, 1, false));
        assert_ne!(unbounded, iota(Some(1), None, 1, false));
        assert!(unbounded > Set::from_values(nums(&[0, 1, 2])));
        assert!(unbounded > Set::array(nums(&[0, 1, 2])));
        assert_eq!(hash_of(&unbounded), hash_of(&iota(Some(0), None, 1, false)));
    }

    #[test]
    fn test_set_order_and_hash() {
        let a = Set::from_values(nums(&[1, 2]));
        let b = Set::from_values(nums(&[2, 1]));
        assert_eq!(a, b);
        let mut seen = HashSet::new();
        seen.insert(Value::Set(a));
        assert!(seen.contains(&Value::Set(b)));
        assert!(Set::from_values(nums(&[1])) < Set::from_values(nums(&[2])));
    }
}
