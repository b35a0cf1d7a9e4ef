//! Domain models used by the engine: questions, samples, test cases and run results.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// One worked example shown with a question (display only, never graded).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
  pub input: String,
  pub output: String,
}

/// One hidden grading case: call the exported function with `args`, expect `expected`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
  pub id: String,
  #[serde(default)] pub args: Vec<Json>,
  pub expected: Json,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionMeta {
  #[serde(default)] pub prompt: Option<String>,
}

/// Canonical question shape. Built by `normalize::normalize` for remote payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
  pub id: String,
  pub title: String,
  pub description: String,
  pub difficulty: String,   // opaque label ("Easy", "Medium", "Hard", ...)
  #[serde(default)] pub tags: Vec<String>,
  #[serde(default)] pub starter_code: String,
  #[serde(default)] pub samples: Vec<Sample>,
  #[serde(default)] pub tests: Vec<TestCase>,
  /// Name of the function the harness invokes for each test case.
  #[serde(default)] pub export_name: Option<String>,
  #[serde(default)] pub language: Option<String>,
  #[serde(default)] pub metadata: Option<QuestionMeta>,
}

impl Question {
  /// Gradable iff it carries at least one test case and names its export.
  pub fn tests_available(&self) -> bool {
    !self.tests.is_empty()
      && self.export_name.as_deref().map(|n| !n.trim().is_empty()).unwrap_or(false)
  }

  /// Lowercase difficulty label, used by clients as a styling hook.
  pub fn difficulty_class(&self) -> String {
    if self.difficulty.is_empty() { "medium".into() } else { self.difficulty.to_lowercase() }
  }
}

/// Outcome of one test case. `output` is `None` when the call raised.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunResult {
  pub id: String,
  pub args: Vec<Json>,
  pub expected: Json,
  pub pass: bool,
  pub output: Option<Json>,
  /// `format_value` rendering of the expected and produced values.
  pub expected_text: String,
  pub received_text: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
  Success,
  Error,
}

/// The single human-readable status line shown to the candidate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Status {
  pub kind: StatusKind,
  pub message: String,
}

impl Status {
  pub fn success(message: impl Into<String>) -> Self {
    Self { kind: StatusKind::Success, message: message.into() }
  }
  pub fn error(message: impl Into<String>) -> Self {
    Self { kind: StatusKind::Error, message: message.into() }
  }
}
