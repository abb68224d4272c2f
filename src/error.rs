//! Error types and formatting for relset
//!
//! Evaluation never recovers locally: every failure below is returned to the
//! caller of `eval`, `resolve` or a set constructor unchanged.

use colored::Colorize;
use thiserror::Error;

use crate::set::Cardinality;

/// Errors produced while evaluating expressions or operating on values
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// An operand is not the kind of value the operator needs
    #[error("{operand} must be {expected}, got {found}")]
    TypeMismatch {
        operand: String,
        expected: &'static str,
        found: String,
    },

    /// A step of zero, or slice bounds with no valid direction
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Relation attributes do not line up for nest/unnest
    #[error("{op}: {message}")]
    SchemaMismatch { op: &'static str, message: String },

    /// Positional access outside `[0, length)`
    #[error("index {index} out of bounds for set of {length} elements")]
    IndexOutOfBounds { index: i64, length: Cardinality },

    /// The operation needs a finite set but the lazy range never ends
    #[error("cannot {operation} unbounded range {value}")]
    Unbounded {
        operation: &'static str,
        value: String,
    },

    /// Name lookup failed in every enclosing scope
    #[error("undefined name: {0}")]
    UndefinedName(String),
}

impl EvalError {
    pub fn type_mismatch(
        operand: impl Into<String>,
        expected: &'static str,
        found: impl std::fmt::Display,
    ) -> Self {
        EvalError::TypeMismatch {
            operand: operand.into(),
            expected,
            found: found.to_string(),
        }
    }

    pub fn schema(op: &'static str, message: impl Into<String>) -> Self {
        EvalError::SchemaMismatch {
            op,
            message: message.into(),
        }
    }

    pub fn unbounded(operation: &'static str, value: impl std::fmt::Display) -> Self {
        EvalError::Unbounded {
            operation,
            value: value.to_string(),
        }
    }

    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            EvalError::TypeMismatch { .. } => "type mismatch",
            EvalError::InvalidRange(_) => "invalid range",
            EvalError::SchemaMismatch { .. } => "schema mismatch",
            EvalError::IndexOutOfBounds { .. } => "index out of bounds",
            EvalError::Unbounded { .. } => "unbounded",
            EvalError::UndefinedName(_) => "undefined name",
        }
    }
}

pub type Result<T, E = EvalError> = std::result::Result<T, E>;

/// Errors surfaced by the update engine
#[cfg(feature = "engine")]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("evaluation failed: {0}")]
    Eval(#[from] EvalError),

    #[error("engine has stopped")]
    Stopped,

    #[error("observer panicked: {0}")]
    ObserverPanic(String),

    #[error("observer failed: {0}")]
    Observer(String),
}

/// Format an evaluation error against the source text of the failing expression
pub fn format_eval_error(error: &EvalError, source: &str) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "{} {}\n",
        "Evaluation error:".red().bold(),
        error
    ));

    output.push_str(&format!(
        "  {} {}\n",
        "-->".blue().bold(),
        error.kind().cyan()
    ));

    if !source.is_empty() {
        output.push_str(&format!("   {}\n", "|".blue()));
        output.push_str(&format!("   {} {}\n", "|".blue(), source));
        output.push_str(&format!("   {}\n", "|".blue()));
    }

    output.push_str(&error_hint(error));
    output
}

fn error_hint(error: &EvalError) -> String {
    let hint = match error {
        EvalError::TypeMismatch { expected, .. } if *expected == "integer" => {
            "Range bounds, steps, and indexes must be whole numbers"
        }
        EvalError::TypeMismatch { .. } => return String::new(),
        EvalError::InvalidRange(_) => {
            "Use a non-zero step whose sign points from start toward end"
        }
        EvalError::SchemaMismatch { .. } => {
            "Every tuple in a relation must share the same attribute names"
        }
        EvalError::IndexOutOfBounds { .. } => "Indexes start at 0 and stop before the count",
        EvalError::Unbounded { .. } => "Give the range an end bound before enumerating it",
        EvalError::UndefinedName(_) => "Check the name is bound in an enclosing scope",
    };
    format!("\n  {} {}\n", "Hint:".yellow().bold(), hint)
}
