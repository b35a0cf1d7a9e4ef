//! Grading harness: compile a submission, call its exported function once per
//! test case and compare each result with the expected value.
//!
//! Whole-run problems (nothing selected, empty source, no tests, compile
//! failure, missing export) become a single error status with no results.
//! Per-case failures, thrown errors included, are recorded and the batch goes on.

use tracing::{debug, instrument};

use crate::compare::{equal, format_json, format_value};
use crate::domain::{Question, RunResult, Status, TestCase};
use crate::script::{Interpreter, Limits, Value};

pub const NO_QUESTION: &str = "Load a question before running tests.";
pub const EMPTY_SOURCE: &str = "Write your solution before running tests.";
pub const TESTS_UNAVAILABLE: &str = "Automated tests are unavailable for this question.";

#[derive(Clone, Debug, PartialEq)]
pub struct RunOutcome {
  pub results: Vec<RunResult>,
  pub passed: usize,
  pub total: usize,
  pub status: Status,
}

impl RunOutcome {
  pub(crate) fn rejected(message: impl Into<String>) -> Self {
    Self { results: Vec::new(), passed: 0, total: 0, status: Status::error(message) }
  }
}

/// The whole-run preconditions, in the order the candidate sees them.
pub fn precheck(source: &str, question: Option<&Question>) -> Result<(), &'static str> {
  let Some(question) = question else { return Err(NO_QUESTION) };
  if source.trim().is_empty() {
    return Err(EMPTY_SOURCE);
  }
  if !question.tests_available() {
    return Err(TESTS_UNAVAILABLE);
  }
  Ok(())
}

pub fn run(source: &str, question: Option<&Question>, limits: Limits) -> RunOutcome {
  run_with(source, question, limits, equal)
}

/// `run` with a caller-supplied comparator.
#[instrument(level = "debug", skip_all, fields(question_id = question.map(|q| q.id.as_str()).unwrap_or(""), source_len = source.len()))]
pub fn run_with<F>(source: &str, question: Option<&Question>, limits: Limits, mut compare: F) -> RunOutcome
where
  F: FnMut(&Value, &Value) -> bool,
{
  if let Err(message) = precheck(source, question) {
    return RunOutcome::rejected(message);
  }
  let Some(question) = question else { return RunOutcome::rejected(NO_QUESTION) };
  let export = question.export_name.as_deref().unwrap_or_default().trim();

  let mut it = Interpreter::new(limits);
  if let Err(e) = it.load(source) {
    debug!(target: "practice_engine", error = %e, "Submission failed to compile");
    return RunOutcome::rejected(e.to_string());
  }
  let func = match it.global(export) {
    Some(f) if f.is_callable() => f,
    _ => return RunOutcome::rejected(format!("Could not find a function named {}.", export)),
  };

  let results: Vec<RunResult> = question.tests
    .iter()
    .map(|case| run_case(&mut it, &func, case, &mut compare))
    .collect();

  let passed = results.iter().filter(|r| r.pass).count();
  let total = results.len();
  let message = format!("Passed {}/{} tests", passed, total);
  let status = if passed == total { Status::success(message) } else { Status::error(message) };
  debug!(target: "practice_engine", passed, total, "Run finished");

  RunOutcome { results, passed, total, status }
}

fn run_case<F>(it: &mut Interpreter, func: &Value, case: &TestCase, compare: &mut F) -> RunResult
where
  F: FnMut(&Value, &Value) -> bool,
{
  let args = case.args.iter().map(Value::from_json).collect();
  let expected = Value::from_json(&case.expected);
  let base = RunResult {
    id: case.id.clone(),
    args: case.args.clone(),
    expected: case.expected.clone(),
    pass: false,
    output: None,
    expected_text: format_json(&case.expected),
    received_text: format_value(&Value::Undefined),
    error: None,
  };

  match it.call(func, args) {
    Ok(out) => RunResult {
      pass: compare(&out, &expected),
      output: out.to_json().ok().flatten(),
      received_text: format_value(&out),
      ..base
    },
    Err(e) => RunResult { error: Some(e.to_string()), ..base },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::StatusKind;
  use serde_json::json;

  fn question(tests: Vec<TestCase>, export: Option<&str>) -> Question {
    let mut q = crate::normalize::normalize(&json!({"title": "Sum"}), 0);
    q.tests = tests;
    q.export_name = export.map(str::to_string);
    q
  }

  fn case(id: &str, args: serde_json::Value, expected: serde_json::Value) -> TestCase {
    let args = args.as_array().cloned().unwrap_or_default();
    TestCase { id: id.into(), args, expected }
  }

  fn addition_question() -> Question {
    question(vec![case("t1", json!([2, 3]), json!(5)), case("t2", json!([0, 0]), json!(1))], Some("add"))
  }

  #[test]
  fn preconditions_report_distinct_statuses() {
    let q = addition_question();
    assert_eq!(run("function add(a, b) { return a + b; }", None, Limits::default()).status, Status::error(NO_QUESTION));
    assert_eq!(run("  \n\t", Some(&q), Limits::default()).status, Status::error(EMPTY_SOURCE));
    let no_tests = question(Vec::new(), Some("add"));
    assert_eq!(run("function add() {}", Some(&no_tests), Limits::default()).status, Status::error(TESTS_UNAVAILABLE));
    let no_export = question(vec![case("t1", json!([]), json!(1))], None);
    assert_eq!(run("function add() {}", Some(&no_export), Limits::default()).status, Status::error(TESTS_UNAVAILABLE));
  }

  #[test]
  fn zero_tests_never_invoke_the_comparator() {
    let q = question(Vec::new(), Some("add"));
    let mut calls = 0;
    let outcome = run_with("function add(a, b) { return a + b; }", Some(&q), Limits::default(), |_, _| {
      calls += 1;
      true
    });
    assert_eq!(calls, 0);
    assert_eq!(outcome.status.message, TESTS_UNAVAILABLE);
    assert!(outcome.results.is_empty());
  }

  #[test]
  fn addition_passes_one_of_two() {
    let outcome = run("function add(a, b) { return a + b; }", Some(&addition_question()), Limits::default());
    assert_eq!((outcome.passed, outcome.total), (1, 2));
    assert_eq!(outcome.status, Status::error("Passed 1/2 tests"));
    assert!(outcome.results[0].pass);
    assert!(!outcome.results[1].pass);
    assert_eq!(outcome.results[1].output, Some(json!(0)));
    assert_eq!(outcome.results[1].received_text, "0");
    assert_eq!(outcome.results[1].expected_text, "1");
    assert!(outcome.results[1].error.is_none());
  }

  #[test]
  fn all_passing_is_success() {
    let q = question(vec![case("t1", json!([[3, 1, 2]]), json!([1, 2, 3]))], Some("sorted"));
    let src = r#"
      const sorted = (xs) => {
        const out = xs.slice();
        for (let i = 0; i < out.length; i++) {
          for (let j = 0; j + 1 < out.length - i; j++) {
            if (out[j] > out[j + 1]) { const t = out[j]; out[j] = out[j + 1]; out[j + 1] = t; }
          }
        }
        return out;
      };
    "#;
    let outcome = run(src, Some(&q), Limits::default());
    assert_eq!(outcome.status.kind, StatusKind::Success);
    assert_eq!(outcome.status.message, "Passed 1/1 tests");
  }

  #[test]
  fn throwing_solution_fails_every_case_with_message() {
    let outcome = run("function add() { throw new Error('boom'); }", Some(&addition_question()), Limits::default());
    assert_eq!((outcome.passed, outcome.total), (0, 2));
    for r in &outcome.results {
      assert!(!r.pass);
      assert!(r.output.is_none());
      assert_eq!(r.error.as_deref(), Some("boom"));
    }
  }

  #[test]
  fn runaway_loop_hits_step_budget() {
    let limits = Limits { max_steps: 10_000, max_call_depth: 64 };
    let outcome = run("function add() { while (true) {} }", Some(&addition_question()), limits);
    assert_eq!(outcome.total, 2);
    assert!(outcome.results.iter().all(|r| r.error.as_deref().map(|e| e.contains("step limit")).unwrap_or(false)));
  }

  #[test]
  fn missing_export_is_reported() {
    let outcome = run("function plus(a, b) { return a + b; }", Some(&addition_question()), Limits::default());
    assert_eq!(outcome.status, Status::error("Could not find a function named add."));
    let outcome = run("var add = 3;", Some(&addition_question()), Limits::default());
    assert_eq!(outcome.status, Status::error("Could not find a function named add."));
  }

  #[test]
  fn compile_errors_are_a_single_status() {
    let outcome = run("function add(a, b) { return a + ; }", Some(&addition_question()), Limits::default());
    assert!(outcome.results.is_empty());
    assert_eq!(outcome.status.kind, StatusKind::Error);
    assert!(outcome.status.message.starts_with("SyntaxError"));
  }

  #[test]
  fn huge_index_assignment_fails_only_that_case() {
    let q = question(vec![case("t1", json!([2, 3]), json!(5)), case("t2", json!([1000, 1]), json!(1001))], Some("add"));
    let src = "function add(a, b) { if (a > 100) { const xs = []; xs[1e12] = 1; } return a + b; }";
    let outcome = run(src, Some(&q), Limits::default());
    assert_eq!((outcome.passed, outcome.total), (1, 2));
    assert!(outcome.results[0].pass);
    assert!(!outcome.results[1].pass);
    assert_eq!(outcome.results[1].error.as_deref(), Some("Invalid array length"));
  }

  #[test]
  fn deeply_nested_source_is_a_compile_error() {
    let src = format!("function add(a, b) {{ return {}a{}; }}", "(".repeat(100_000), ")".repeat(100_000));
    let outcome = run(&src, Some(&addition_question()), Limits::default());
    assert!(outcome.results.is_empty());
    assert_eq!(outcome.status.kind, StatusKind::Error);
    assert!(outcome.status.message.contains("nesting too deep"), "{}", outcome.status.message);
  }

  #[test]
  fn cases_do_not_share_argument_mutations() {
    let q = question(
      vec![case("t1", json!([[1]]), json!(2)), case("t2", json!([[1]]), json!(2))],
      Some("grow"),
    );
    let outcome = run("function grow(xs) { xs.push(0); return xs.length; }", Some(&q), Limits::default());
    assert_eq!(outcome.passed, 2);
  }
}
