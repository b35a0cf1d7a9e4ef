//! Client for the remote question service.
//!
//! One endpoint: `POST {base_url}/technical_questions` with
//! `{"job_description", "top_k"}`. Success bodies carry `{"questions": [...]}`,
//! failures a non-2xx status and `{"error": "..."}`. Raw question payloads are
//! returned untouched; `normalize` owns their shape.
//!
//! NOTE: job descriptions can be long and personal; only their length is logged.
//! Error bodies from the service are logged truncated.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::config::ServiceConfig;
use crate::util::trunc_for_log;

pub const GENERIC_FETCH_ERROR: &str = "Unable to fetch technical questions.";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
  #[error("Job description is empty.")]
  EmptyQuery,
  #[error("Request was cancelled.")]
  Cancelled,
  #[error("Unable to fetch technical questions.")]
  Transport(String),
  /// Non-2xx response; carries the service's own message when it sent one.
  #[error("{}", .message.as_deref().unwrap_or(GENERIC_FETCH_ERROR))]
  Server { status: u16, message: Option<String> },
  #[error("Unable to fetch technical questions.")]
  Decode(String),
}

impl FetchError {
  /// Text shown to the candidate.
  pub fn user_message(&self) -> String {
    self.to_string()
  }
}

/// Anything that can answer "questions for this job description".
/// The HTTP client in production, an in-memory fake in tests.
#[async_trait]
pub trait QuestionSource: Send + Sync {
  async fn fetch(&self, job_description: &str, top_k: usize) -> Result<Vec<Json>, FetchError>;
}

#[derive(Clone)]
pub struct QuestionService {
  pub client: reqwest::Client,
  pub base_url: String,
}

#[derive(Serialize)]
struct QuestionsRequest<'a> {
  job_description: &'a str,
  top_k: usize,
}

#[derive(Deserialize)]
struct QuestionsResponse {
  #[serde(default)]
  questions: Json,
}

impl QuestionService {
  pub fn new(cfg: &ServiceConfig) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.timeout_secs))
      .build()?;
    Ok(Self { client, base_url: cfg.base_url.trim_end_matches('/').to_string() })
  }
}

#[async_trait]
impl QuestionSource for QuestionService {
  #[instrument(level = "info", skip(self, job_description), fields(query_len = job_description.len()))]
  async fn fetch(&self, job_description: &str, top_k: usize) -> Result<Vec<Json>, FetchError> {
    let url = format!("{}/technical_questions", self.base_url);
    let start = std::time::Instant::now();

    let res = self.client.post(&url)
      .header(USER_AGENT, "practice-engine/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&QuestionsRequest { job_description, top_k })
      .send().await
      .map_err(|e| {
        error!(target: "practice", error = %e, "Question service unreachable");
        FetchError::Transport(e.to_string())
      })?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_service_error(&body);
      error!(target: "practice", status, body = %trunc_for_log(&body, 200), "Question service returned an error");
      return Err(FetchError::Server { status, message });
    }

    let body: QuestionsResponse = res.json().await.map_err(|e| FetchError::Decode(e.to_string()))?;
    let questions = match body.questions {
      Json::Array(items) => items,
      _ => Vec::new(),
    };
    info!(target: "practice", elapsed = ?start.elapsed(), count = questions.len(), "Questions received");
    Ok(questions)
  }
}

/// Try to extract the service's `{"error": "..."}` message from a failure body.
fn extract_service_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) if !w.error.trim().is_empty() => Some(w.error),
    _ => None,
  }
}


/// In-memory `QuestionSource` for cache and session tests: counts requests and
/// can hold every response until the test releases it.
#[cfg(test)]
pub(crate) mod fake {
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  use async_trait::async_trait;
  use serde_json::{json, Value as Json};
  use tokio::sync::Semaphore;

  use super::{FetchError, QuestionSource};

  pub struct FakeSource {
    requests: AtomicUsize,
    responses: Mutex<HashMap<String, Result<Vec<Json>, FetchError>>>,
    gate: Option<Semaphore>,
  }

  impl FakeSource {
    pub fn new() -> Self {
      Self { requests: AtomicUsize::new(0), responses: Mutex::new(HashMap::new()), gate: None }
    }

    /// Every fetch waits for a `release` before answering.
    pub fn gated() -> Self {
      Self { gate: Some(Semaphore::new(0)), ..Self::new() }
    }

    pub fn respond(self, query: &str, response: Result<Vec<Json>, FetchError>) -> Self {
      self.responses.lock().unwrap().insert(query.to_string(), response);
      self
    }

    pub fn release(&self, n: usize) {
      if let Some(gate) = &self.gate {
        gate.add_permits(n);
      }
    }

    pub fn request_count(&self) -> usize {
      self.requests.load(Ordering::SeqCst)
    }
  }

  /// A raw payload the way the service sends it.
  pub fn raw_question(title: &str) -> Json {
    json!({"title": title, "difficulty": "Easy", "problem_description": format!("{} description", title)})
  }

  #[async_trait]
  impl QuestionSource for FakeSource {
    async fn fetch(&self, job_description: &str, _top_k: usize) -> Result<Vec<Json>, FetchError> {
      self.requests.fetch_add(1, Ordering::SeqCst);
      if let Some(gate) = &self.gate {
        if let Ok(permit) = gate.acquire().await {
          permit.forget();
        }
      }
      let response = self.responses.lock().unwrap().get(job_description).cloned();
      response.unwrap_or_else(|| Ok(Vec::new()))
    }
  }
}
