//! Nest and unnest: grouping tuple attributes into nested relations and back
//!
//! A relation here is a set whose elements are tuples that all share one
//! attribute schema. `nest` partitions the tuples by the attributes left
//! outside the group; `unnest` crosses each outer tuple with the rows of its
//! nested relation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use crate::ast::Expression;
use crate::error::{EvalError, Result};
use crate::evaluator::Eval;
use crate::scope::Scope;
use crate::set::{Cardinality, Set};
use crate::value::{Names, Tuple, Value};

/// The attribute names every tuple of `set` shares
///
/// An empty set has no attributes. Fails when an element is not a tuple, when
/// two tuples disagree on their names, or when `set` never ends.
pub fn relation_attrs(set: &Set, op: &'static str) -> Result<Names> {
    if set.count() == Cardinality::Infinite {
        return Err(EvalError::unbounded(op, set));
    }
    let mut attrs: Option<Names> = None;
    for element in set.enumerate()? {
        let tuple = element.as_tuple().ok_or_else(|| {
            EvalError::schema(op, format!("relation element {} is not a tuple", element))
        })?;
        let names = tuple.names();
        if let Some(expected) = &attrs {
            if *expected != names {
                return Err(EvalError::schema(
                    op,
                    format!(
                        "tuple {} does not match relation attrs {}",
                        tuple,
                        DisplayNames(expected)
                    ),
                ));
            }
        } else {
            attrs = Some(names);
        }
    }
    Ok(attrs.unwrap_or_default())
}

/// Group the attributes in `attrs` under the new attribute `attr`
pub fn nest(set: &Set, attrs: &Names, attr: &str) -> Result<Set> {
    let rel_attrs = relation_attrs(set, "nest")?;
    if set.is_empty() {
        return Ok(Set::empty());
    }
    check_subset("nest", attrs, &rel_attrs)?;
    let outer: Names = rel_attrs.difference(attrs).cloned().collect();
    if outer.contains(attr) {
        return Err(EvalError::schema(
            "nest",
            format!("attribute {} already in relation", attr),
        ));
    }

    let mut groups: BTreeMap<Tuple, BTreeSet<Value>> = BTreeMap::new();
    for element in set.enumerate()? {
        if let Value::Tuple(tuple) = element {
            groups
                .entry(tuple.project(&outer))
                .or_default()
                .insert(Value::Tuple(tuple.project(attrs)));
        }
    }
    debug!(groups = groups.len(), "nested {} under {}", DisplayNames(attrs), attr);

    Ok(Set::from_values(groups.into_iter().map(|(key, rows)| {
        Value::Tuple(key.with(attr, Value::Set(Set::Generic(rows))))
    })))
}

/// Cross every tuple with the rows of its nested relation at `attr`
pub fn unnest(set: &Set, attr: &str) -> Result<Set> {
    let rel_attrs = relation_attrs(set, "unnest")?;
    if set.is_empty() {
        return Ok(Set::empty());
    }
    if !rel_attrs.contains(attr) {
        return Err(EvalError::schema(
            "unnest",
            format!("attribute {} not in relation attrs {}", attr, DisplayNames(&rel_attrs)),
        ));
    }
    let outer: Names = rel_attrs.iter().filter(|n| *n != attr).cloned().collect();
    if outer.is_empty() {
        return Err(EvalError::schema(
            "unnest",
            format!("no attributes left to group by besides {}", attr),
        ));
    }

    let mut nested_attrs: Option<Names> = None;
    let mut result = BTreeSet::new();
    for element in set.enumerate()? {
        let Value::Tuple(tuple) = element else {
            continue;
        };
        let nested = match tuple.get(attr) {
            Some(Value::Set(nested)) => nested,
            Some(other) => {
                return Err(EvalError::schema(
                    "unnest",
                    format!("attribute {} holds {}, not a relation", attr, other),
                ))
            }
            None => continue,
        };
        if nested.is_empty() {
            continue;
        }
        let names = relation_attrs(nested, "unnest")?;
        if let Some(expected) = &nested_attrs {
            if *expected != names {
                return Err(EvalError::schema(
                    "unnest",
                    format!(
                        "nested relation attrs {} differ from {}",
                        DisplayNames(&names),
                        DisplayNames(expected)
                    ),
                ));
            }
        } else {
            if let Some(clash) = names.intersection(&outer).next() {
                return Err(EvalError::schema(
                    "unnest",
                    format!("nested attribute {} clashes with outer attribute", clash),
                ));
            }
            nested_attrs = Some(names);
        }
        let base = tuple.without(attr);
        for row in nested.enumerate()? {
            if let Value::Tuple(row) = row {
                result.insert(Value::Tuple(base.merge(&row)));
            }
        }
    }
    debug!(rows = result.len(), "unnested {}", attr);
    Ok(Set::Generic(result))
}

fn check_subset(op: &'static str, attrs: &Names, rel_attrs: &Names) -> Result<()> {
    let missing: Names = attrs.difference(rel_attrs).cloned().collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EvalError::schema(
            op,
            format!(
                "attrs {} not in relation attrs {}",
                DisplayNames(&missing),
                DisplayNames(rel_attrs)
            ),
        ))
    }
}

/// `|a, b|`
pub(crate) struct DisplayNames<'a>(pub &'a Names);

impl fmt::Display for DisplayNames<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(String::as_str).collect();
        write!(f, "|{}|", names.join(", "))
    }
}

/// `(lhs nest |attrs| attr)`, or `(lhs nest ~|attrs| attr)` to name the
/// attributes kept outside the nest instead
#[derive(Debug, Clone, PartialEq)]
pub struct NestExpr {
    pub lhs: Box<Expression>,
    pub attrs: Names,
    pub attr: String,
    pub inverse: bool,
}

impl NestExpr {
    pub fn new(lhs: Expression, attrs: Names, attr: impl Into<String>, inverse: bool) -> Self {
        Self {
            lhs: Box::new(lhs),
            attrs,
            attr: attr.into(),
            inverse,
        }
    }
}

impl Eval for NestExpr {
    fn eval(&self, scope: &Scope) -> Result<Value> {
        let value = self.lhs.eval(scope)?;
        let set = value.as_set("nest target")?;
        if !self.inverse || set.is_empty() {
            return Ok(Value::Set(nest(set, &self.attrs, &self.attr)?));
        }
        let rel_attrs = relation_attrs(set, "nest")?;
        check_subset("nest", &self.attrs, &rel_attrs)?;
        let grouped: Names = rel_attrs.difference(&self.attrs).cloned().collect();
        if grouped.is_empty() {
            return Err(EvalError::schema(
                "nest",
                format!(
                    "nest attrs cannot be on all of relation attrs {}",
                    DisplayNames(&rel_attrs)
                ),
            ));
        }
        Ok(Value::Set(nest(set, &grouped, &self.attr)?))
    }
}

impl fmt::Display for NestExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inverse = if self.inverse { "~" } else { "" };
        write!(
            f,
            "({} nest {}{} {})",
            self.lhs,
            inverse,
            DisplayNames(&self.attrs),
            self.attr
        )
    }
}

/// `(lhs unnest attr)`
#[derive(Debug, Clone, PartialEq)]
pub struct UnnestExpr {
    pub lhs: Box<Expression>,
    pub attr: String,
}

impl UnnestExpr {
    pub fn new(lhs: Expression, attr: impl Into<String>) -> Self {
        Self {
            lhs: Box::new(lhs),
            attr: attr.into(),
        }
    }
}

impl Eval for UnnestExpr {
    fn eval(&self, scope: &Scope) -> Result<Value> {
        let value = self.lhs.eval(scope)?;
        let set = value.as_set("unnest target")?;
        Ok(Value::Set(unnest(set, &self.attr)?))
    }
}

impl fmt::Display for UnnestExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} unnest {})", self.lhs, self.attr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(a: i64, b: i64, c: i64) -> Value {
        Value::Tuple(
            [("a", Value::from(a)), ("b", Value::from(b)), ("c", Value::from(c))]
                .into_iter()
                .collect(),
        )
    }

    fn names(ns: &[&str]) -> Names {
        ns.iter().map(|n| n.to_string()).collect()
    }

    fn relation() -> Set {
        Set::from_values([row(1, 10, 100), row(1, 11, 101), row(2, 20, 200)])
    }

    #[test]
    fn test_relation_attrs() {
        assert_eq!(relation_attrs(&relation(), "nest").unwrap(), names(&["a", "b", "c"]));
        assert_eq!(relation_attrs(&Set::empty(), "nest").unwrap(), Names::new());

        let mixed = Set::from_values([row(1, 2, 3), Value::from(4)]);
        assert!(matches!(
            relation_attrs(&mixed, "nest"),
            Err(EvalError::SchemaMismatch { op: "nest", .. })
        ));

        let ragged = Set::from_values([
            row(1, 2, 3),
            Value::Tuple([("a", Value::from(1))].into_iter().collect()),
        ]);
        assert!(relation_attrs(&ragged, "unnest").is_err());
    }

    #[test]
    fn test_nest_groups_by_outer_attrs() {
        let nested = nest(&relation(), &names(&["b", "c"]), "g").unwrap();
        assert_eq!(nested.count(), Cardinality::Finite(2));
        let first = nested.call(0).unwrap();
        let first = first.as_tuple().unwrap();
        assert_eq!(first.get("a"), Some(&Value::from(1)));
        let group = first.get("g").unwrap().as_set("g").unwrap();
        assert_eq!(group.count(), Cardinality::Finite(2));
    }

    #[test]
    fn test_nest_missing_attr() {
        let err = nest(&relation(), &names(&["z"]), "g").unwrap_err();
        assert!(err.to_string().starts_with("nest: attrs |z| not in relation attrs"));
    }

    #[test]
    fn test_nest_empty_set() {
        assert_eq!(nest(&Set::empty(), &names(&["b"]), "g").unwrap(), Set::empty());
    }

    #[test]
    fn test_round_trip() {
        let r = relation();
        let nested = nest(&r, &names(&["b", "c"]), "g").unwrap();
        assert_eq!(unnest(&nested, "g").unwrap(), r);

        let nested = nest(&r, &names(&["c"]), "g").unwrap();
        assert_eq!(nested.count(), Cardinality::Finite(3));
        assert_eq!(unnest(&nested, "g").unwrap(), r);
    }

    #[test]
    fn test_unnest_errors() {
        let r = relation();
        assert!(matches!(
            unnest(&r, "g"),
            Err(EvalError::SchemaMismatch { op: "unnest", .. })
        ));
        assert!(matches!(
            unnest(&r, "a"),
            Err(EvalError::SchemaMismatch { .. })
        ));

        let only_nested = Set::from_values([Value::Tuple(
            [("g", Value::Set(r))].into_iter().collect(),
        )]);
        let err = unnest(&only_nested, "g").unwrap_err();
        assert!(err.to_string().contains("no attributes left"));
    }

    fn holder(a: i64, inner: &str) -> Value {
        let nested = Value::Tuple([(inner, Value::from(a * 10))].into_iter().collect());
        Value::Tuple(
            [("a", Value::from(a)), ("g", Value::Set(Set::from_values([nested])))]
                .into_iter()
                .collect(),
        )
    }

    #[test]
    fn test_unnest_heterogeneous_schema() {
        let mixed = Set::from_values([holder(1, "b"), holder(2, "c")]);
        match unnest(&mixed, "g").unwrap_err() {
            EvalError::SchemaMismatch { op, message } => {
                assert_eq!(op, "unnest");
                assert!(message.contains("differ from"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }

        let uniform = Set::from_values([holder(1, "b"), holder(2, "b")]);
        assert_eq!(unnest(&uniform, "g").unwrap().count(), Cardinality::Finite(2));
    }

    #[test]
    fn test_unnest_attr_clash() {
        let clashing = Set::from_values([holder(1, "a")]);
        match unnest(&clashing, "g").unwrap_err() {
            EvalError::SchemaMismatch { op, message } => {
                assert_eq!(op, "unnest");
                assert_eq!(message, "nested attribute a clashes with outer attribute");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nest_target_clash() {
        match nest(&relation(), &names(&["b"]), "a").unwrap_err() {
            EvalError::SchemaMismatch { op, message } => {
                assert_eq!(op, "nest");
                assert_eq!(message, "attribute a already in relation");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Reusing a grouped attribute's name is fine
        let nested = nest(&relation(), &names(&["b", "c"]), "b").unwrap();
        assert_eq!(nested.count(), Cardinality::Finite(2));
    }

    #[test]
    fn test_nest_expr_inverse() {
        let scope = Scope::new().with("r", Value::Set(relation()));
        let expr = NestExpr::new(Expression::variable("r"), names(&["a"]), "g", true);
        assert_eq!(expr.to_string(), "(r nest ~|a| g)");
        let forward = NestExpr::new(Expression::variable("r"), names(&["b", "c"]), "g", false);
        assert_eq!(forward.to_string(), "(r nest |b, c| g)");
        assert_eq!(expr.eval(&scope).unwrap(), forward.eval(&scope).unwrap());

        let all = NestExpr::new(Expression::variable("r"), names(&["a", "b", "c"]), "g", true);
        let err = all.eval(&scope).unwrap_err();
        assert!(err
            .to_string()
            .contains("nest attrs cannot be on all of relation attrs"));
    }

    #[test]
    fn test_nest_non_set() {
        let expr = NestExpr::new(Expression::number(1), names(&["a"]), "g", false);
        let err = expr.eval(&Scope::new()).unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
        assert!(err.to_string().starts_with("nest target must be set"));
    }

    #[test]
    fn test_unnest_expr() {
        let nested = nest(&relation(), &names(&["b", "c"]), "g").unwrap();
        let scope = Scope::new().with("n", Value::Set(nested));
        let expr = UnnestExpr::new(Expression::variable("n"), "g");
        assert_eq!(expr.to_string(), "(n unnest g)");
        assert_eq!(expr.eval(&scope).unwrap(), Value::Set(relation()));
    }
}
