//! Evaluator for relset - resolves variables, literals, calls and set operators

use tracing::debug;

use crate::ast::Expression;
use crate::error::{EvalError, Result};
use crate::scope::Scope;
use crate::set::Set;
use crate::value::{NativeFunction, Tuple, Value};

/// Anything that produces a value from a scope
///
/// Evaluation is pure with respect to the scope: it never mutates bindings,
/// and any failure aborts the whole expression.
pub trait Eval {
    fn eval(&self, scope: &Scope) -> Result<Value>;
}

impl Eval for Expression {
    fn eval(&self, scope: &Scope) -> Result<Value> {
        match self {
            Expression::Literal { value } => Ok(value.clone()),
            Expression::Variable { name } => scope.get(name).cloned(),
            Expression::Set { elements } => {
                let values = eval_all(elements, scope)?;
                Ok(Value::Set(Set::from_values(values)))
            }
            Expression::Array { elements } => {
                let values = eval_all(elements, scope)?;
                Ok(Value::Set(Set::array(values)))
            }
            Expression::Tuple { attrs } => {
                let tuple = attrs
                    .iter()
                    .map(|(name, expr)| Ok((name.as_str(), expr.eval(scope)?)))
                    .collect::<Result<Tuple>>()?;
                Ok(Value::Tuple(tuple))
            }
            Expression::Iota(expr) => expr.eval(scope),
            Expression::Slice(expr) => expr.eval(scope),
            Expression::Call { callee, arg } => call(&callee.eval(scope)?, &arg.eval(scope)?),
            Expression::Nest(expr) => expr.eval(scope),
            Expression::Unnest(expr) => expr.eval(scope),
        }
    }
}

/// Native functions every top-level scope starts with
pub fn globals() -> Vec<(String, Value)> {
    let str_fn = NativeFunction::new("str", |value| match value {
        Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    });
    vec![("str".to_string(), Value::Function(str_fn))]
}

fn eval_all(exprs: &[Expression], scope: &Scope) -> Result<Vec<Value>> {
    exprs.iter().map(|expr| expr.eval(scope)).collect()
}

/// Apply a callee to one argument: sets are indexed, functions invoked
pub fn call(callee: &Value, arg: &Value) -> Result<Value> {
    match callee {
        Value::Set(set) => set.call(arg.as_int("index")?),
        Value::Function(func) => {
            debug!(function = func.name(), "calling native function");
            Ok(func.call(arg))
        }
        other => Err(EvalError::type_mismatch(
            "call target",
            "set or function",
            other,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iota::IotaKind;
    use crate::range::RangeExpr;
    use crate::set::Cardinality;

    fn num(n: i64) -> Option<Expression> {
        Some(Expression::number(n))
    }

    #[test]
    fn test_literal_and_variable() {
        let scope = Scope::new().with("x", Value::from(5));
        assert_eq!(Expression::number(3).eval(&scope).unwrap(), Value::from(3));
        assert_eq!(Expression::variable("x").eval(&scope).unwrap(), Value::from(5));
        assert!(matches!(
            Expression::variable("y").eval(&scope),
            Err(EvalError::UndefinedName(_))
        ));
    }

    #[test]
    fn test_collection_literals() {
        let scope = Scope::new();
        let set = Expression::set(vec![Expression::number(2), Expression::number(1), Expression::number(2)]);
        assert_eq!(set.eval(&scope).unwrap().to_string(), "{1, 2}");
        let arr = Expression::array(vec![]);
        assert_eq!(arr.eval(&scope).unwrap(), Value::Set(Set::empty()));
        let tuple = Expression::tuple([("a", Expression::number(1))]);
        assert_eq!(tuple.eval(&scope).unwrap().to_string(), "(a: 1)");
    }

    #[test]
    fn test_call_indexes_sets() {
        let scope = Scope::new();
        let range = Expression::iota(RangeExpr::new(num(10), num(20), num(5), false), IotaKind::Array);
        let expr = Expression::call(range, Expression::number(1));
        assert_eq!(expr.eval(&scope).unwrap(), Value::from(15));

        let expr = Expression::call(
            Expression::array(vec![Expression::string("a")]),
            Expression::number(4),
        );
        assert!(matches!(
            expr.eval(&scope),
            Err(EvalError::IndexOutOfBounds {
                index: 4,
                length: Cardinality::Finite(1)
            })
        ));
    }

    #[test]
    fn test_call_function() {
        let double = NativeFunction::new("double", |v| match v {
            Value::Number(n) => Value::from(n * 2.0),
            other => other.clone(),
        });
        let scope = Scope::new().with("double", Value::Function(double));
        let expr = Expression::call(Expression::variable("double"), Expression::number(21));
        assert_eq!(expr.eval(&scope).unwrap(), Value::from(42));
    }

    #[test]
    fn test_str_global() {
        let scope = Scope::from_bindings(globals());
        let expr = Expression::call(
            Expression::variable("str"),
            Expression::set(vec![Expression::number(2), Expression::number(1)]),
        );
        assert_eq!(expr.eval(&scope).unwrap(), Value::from("{1, 2}"));
        let expr = Expression::call(Expression::variable("str"), Expression::string("hi"));
        assert_eq!(expr.eval(&scope).unwrap(), Value::from("hi"));
    }

    #[test]
    fn test_call_non_callable() {
        let expr = Expression::call(Expression::number(1), Expression::number(0));
        let err = expr.eval(&Scope::new()).unwrap_err();
        assert_eq!(err.to_string(), "call target must be set or function, got 1");
    }

    #[test]
    fn test_failure_aborts_expression() {
        let expr = Expression::set(vec![Expression::number(1), Expression::variable("nope")]);
        assert!(expr.eval(&Scope::new()).is_err());
    }
}
