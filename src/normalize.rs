//! Raw remote payload → canonical `Question`.
//!
//! Total over any JSON value: every missing or mistyped field falls back to a
//! default. Remote questions never carry test cases or an export name.

use serde_json::Value as Json;

use crate::domain::{Question, QuestionMeta, Sample};

pub const DEFAULT_DIFFICULTY: &str = "Medium";
pub const DEFAULT_LANGUAGE: &str = "python";
pub const DEFAULT_DESCRIPTION: &str = "No description provided.";

fn text(raw: &Json, key: &str) -> Option<String> {
  match raw.get(key)? {
    Json::String(s) => Some(s.clone()),
    Json::Number(n) => Some(n.to_string()),
    Json::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

/// Sample fields are usually strings; structured values keep their JSON text.
fn sample_text(raw: &Json, key: &str) -> String {
  match raw.get(key) {
    None | Some(Json::Null) => String::new(),
    Some(Json::String(s)) => s.clone(),
    Some(other) => other.to_string(),
  }
}

pub fn normalize(raw: &Json, index: usize) -> Question {
  let samples = match raw.get("input_output") {
    Some(Json::Array(items)) => items
      .iter()
      .map(|s| Sample { input: sample_text(s, "input"), output: sample_text(s, "output") })
      .collect(),
    _ => Vec::new(),
  };

  let tags = match raw.get("tags") {
    Some(Json::Array(items)) => items.iter().filter_map(|t| t.as_str().map(str::to_string)).collect(),
    _ => Vec::new(),
  };

  let desc = text(raw, "desc");

  Question {
    id: text(raw, "id").unwrap_or_else(|| format!("remote-question-{}", index)),
    title: text(raw, "title").unwrap_or_else(|| format!("Question {}", index + 1)),
    description: text(raw, "problem_description")
      .or_else(|| desc.clone())
      .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
    difficulty: text(raw, "difficulty").unwrap_or_else(|| DEFAULT_DIFFICULTY.to_string()),
    tags,
    starter_code: text(raw, "starter_code").unwrap_or_default(),
    samples,
    tests: Vec::new(),
    export_name: None,
    language: Some(text(raw, "language").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())),
    metadata: Some(QuestionMeta { prompt: desc }),
  }
}
