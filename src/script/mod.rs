//! Solution runtime: a small JavaScript-like language evaluated by a
//! tree-walking interpreter.
//!
//! The harness compiles a candidate's source with `Interpreter::load`, looks up
//! the exported function with `Interpreter::global`, and calls it once per test
//! case. Budgets in `Limits` stop runaway loops and recursion; they are not an
//! isolation boundary.

mod ast;
mod builtins;
mod interp;
mod lexer;
mod parser;
mod value;

use serde::Deserialize;
use thiserror::Error;

pub use interp::Interpreter;
pub use value::{Value, MAX_NESTING};

/// Execution budgets applied to each top-level entry into the interpreter.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Limits {
  pub max_steps: u64,
  pub max_call_depth: usize,
}

impl Default for Limits {
  fn default() -> Self {
    Self { max_steps: 1_000_000, max_call_depth: 128 }
  }
}

/// Every failure a submission can produce. `Display` is the message the
/// candidate sees next to the failing test.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
  #[error("SyntaxError: {message} (line {line})")]
  Syntax { message: String, line: usize },
  #[error("SyntaxError: {0}")]
  Misplaced(String),
  /// A value raised by `throw`.
  #[error("{0}")]
  Thrown(String),
  #[error("{0}")]
  Type(String),
  #[error("{0} is not defined")]
  Reference(String),
  #[error("Maximum call stack size exceeded")]
  CallDepth,
  #[error("Execution step limit exceeded ({0} steps)")]
  StepLimit(u64),
}

impl ScriptError {
  pub(crate) fn syntax(message: impl Into<String>, line: usize) -> Self {
    ScriptError::Syntax { message: message.into(), line }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn top_level_return_is_rejected() {
    let mut it = Interpreter::new(Limits::default());
    let err = it.load("return 1;").unwrap_err();
    assert_eq!(err, ScriptError::Misplaced("'return' outside of function".into()));
  }

  #[test]
  fn top_level_statements_run_on_load() {
    let mut it = Interpreter::new(Limits::default());
    it.load("var base = 40; function answer() { return base + 2; }").unwrap();
    let f = it.global("answer").unwrap();
    assert!(f.is_callable());
    assert_eq!(it.call(&f, Vec::new()).unwrap().to_display_string(), "42");
  }

  #[test]
  fn limits_deserialize_with_defaults() {
    let limits: Limits = toml::from_str("max_steps = 500").unwrap();
    assert_eq!(limits, Limits { max_steps: 500, max_call_depth: 128 });
  }
}
