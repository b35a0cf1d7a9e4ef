//! Question cache and the cancellable fetch in front of it.
//!
//! The cache maps a trimmed job description to its normalized questions. It is
//! append-only: the first successful non-empty result for a key wins and is
//! never overwritten. Empty results and failures are never stored.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::{debug, info, instrument};

use crate::domain::Question;
use crate::normalize::normalize;
use crate::service::{FetchError, QuestionSource};

pub type Questions = Arc<Vec<Question>>;

#[derive(Clone, Default)]
pub struct QuestionCache {
  inner: Arc<RwLock<HashMap<String, Questions>>>,
}

impl QuestionCache {
  pub async fn get(&self, key: &str) -> Option<Questions> {
    self.inner.read().await.get(key).cloned()
  }

  /// Store `questions` under `key` unless the key already exists; returns the
  /// entry that is in the cache afterwards.
  pub async fn insert_if_absent(&self, key: String, questions: Vec<Question>) -> Questions {
    let mut map = self.inner.write().await;
    map.entry(key).or_insert_with(|| Arc::new(questions)).clone()
  }

  #[cfg(test)]
  pub async fn len(&self) -> usize {
    self.inner.read().await.len()
  }
}

/// Cooperative cancellation for one fetch. Clones share the same flag.
#[derive(Clone)]
pub struct CancelHandle {
  tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
  fn default() -> Self {
    Self::new()
  }
}

impl CancelHandle {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(false);
    Self { tx: Arc::new(tx) }
  }

  pub fn cancel(&self) {
    self.tx.send_replace(true);
  }

  pub fn is_cancelled(&self) -> bool {
    *self.tx.borrow()
  }

  /// Resolves once `cancel` has been called.
  pub async fn cancelled(&self) {
    let mut rx = self.tx.subscribe();
    // The sender lives as long as `self`, so this only returns on cancellation.
    let _ = rx.wait_for(|c| *c).await;
  }
}

/// Cache-first question retrieval.
#[derive(Clone)]
pub struct QuestionFetcher {
  source: Arc<dyn QuestionSource>,
  cache: QuestionCache,
}

impl QuestionFetcher {
  pub fn new(source: Arc<dyn QuestionSource>) -> Self {
    Self { source, cache: QuestionCache::default() }
  }

  pub fn cache(&self) -> &QuestionCache {
    &self.cache
  }

  /// Questions for `query`: from the cache when present, otherwise from exactly
  /// one request to the source. A cancelled fetch never touches the cache.
  #[instrument(level = "debug", skip(self, query, cancel), fields(query_len = query.len()))]
  pub async fn get_questions(
    &self,
    query: &str,
    top_k: usize,
    cancel: &CancelHandle,
  ) -> Result<Questions, FetchError> {
    let key = query.trim();
    if key.is_empty() {
      return Err(FetchError::EmptyQuery);
    }
    if let Some(hit) = self.cache.get(key).await {
      debug!(target: "practice_engine", count = hit.len(), "Question cache hit");
      return Ok(hit);
    }
    if cancel.is_cancelled() {
      return Err(FetchError::Cancelled);
    }

    let res = tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(FetchError::Cancelled),
      res = self.source.fetch(key, top_k) => res,
    };
    // A response that raced with cancellation is dropped as well.
    if cancel.is_cancelled() {
      debug!(target: "practice_engine", "Question fetch cancelled");
      return Err(FetchError::Cancelled);
    }

    let questions: Vec<Question> = res?
      .iter()
      .enumerate()
      .map(|(index, raw)| normalize(raw, index))
      .collect();

    if questions.is_empty() {
      info!(target: "practice_engine", "No questions for job description");
      return Ok(Arc::new(questions));
    }
    info!(target: "practice_engine", count = questions.len(), "Caching questions");
    Ok(self.cache.insert_if_absent(key.to_string(), questions).await)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::service::fake::{raw_question, FakeSource};

  fn fetcher(source: FakeSource) -> (QuestionFetcher, Arc<FakeSource>) {
    let source = Arc::new(source);
    (QuestionFetcher::new(source.clone()), source)
  }

  #[tokio::test]
  async fn repeated_query_hits_cache() {
    let (f, src) = fetcher(FakeSource::new().respond("rust dev", Ok(vec![raw_question("A"), raw_question("B")])));
    let cancel = CancelHandle::new();
    let first = f.get_questions("rust dev", 3, &cancel).await.unwrap();
    let second = f.get_questions("  rust dev\n", 3, &cancel).await.unwrap();
    assert_eq!(src.request_count(), 1);
    assert_eq!(first.len(), 2);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first[1].id, "remote-question-1");
  }

  #[tokio::test]
  async fn empty_query_makes_no_request() {
    let (f, src) = fetcher(FakeSource::new());
    let err = f.get_questions("   ", 3, &CancelHandle::new()).await.unwrap_err();
    assert_eq!(err, FetchError::EmptyQuery);
    assert_eq!(src.request_count(), 0);
  }

  #[tokio::test]
  async fn empty_results_are_not_cached() {
    let (f, src) = fetcher(FakeSource::new());
    let cancel = CancelHandle::new();
    assert!(f.get_questions("nothing", 3, &cancel).await.unwrap().is_empty());
    assert!(f.get_questions("nothing", 3, &cancel).await.unwrap().is_empty());
    assert_eq!(src.request_count(), 2);
    assert_eq!(f.cache().len().await, 0);
  }

  #[tokio::test]
  async fn failures_leave_cache_unchanged() {
    let err = FetchError::Server { status: 500, message: Some("Index not built".into()) };
    let (f, _src) = fetcher(FakeSource::new().respond("q", Err(err.clone())));
    assert_eq!(f.get_questions("q", 3, &CancelHandle::new()).await.unwrap_err(), err);
    assert_eq!(f.cache().len().await, 0);
  }

  #[tokio::test]
  async fn cancelled_fetch_is_abandoned_without_cache_write() {
    let (f, src) = fetcher(FakeSource::gated().respond("q", Ok(vec![raw_question("A")])));
    let cancel = CancelHandle::new();
    let task = {
      let (f, cancel) = (f.clone(), cancel.clone());
      tokio::spawn(async move { f.get_questions("q", 3, &cancel).await })
    };
    while src.request_count() == 0 {
      tokio::task::yield_now().await;
    }
    cancel.cancel();
    assert_eq!(task.await.unwrap().unwrap_err(), FetchError::Cancelled);
    src.release(1);
    assert_eq!(f.cache().len().await, 0);
  }

  #[tokio::test]
  async fn first_write_wins() {
    let cache = QuestionCache::default();
    let a = crate::normalize::normalize(&raw_question("A"), 0);
    let b = crate::normalize::normalize(&raw_question("B"), 0);
    cache.insert_if_absent("k".into(), vec![a.clone()]).await;
    let kept = cache.insert_if_absent("k".into(), vec![b]).await;
    assert_eq!(kept[0], a);
  }

  #[tokio::test]
  async fn cancel_handle_wakes_waiters() {
    let cancel = CancelHandle::new();
    let waiter = {
      let cancel = cancel.clone();
      tokio::spawn(async move { cancel.cancelled().await })
    };
    cancel.cancel();
    waiter.await.unwrap();
    assert!(cancel.is_cancelled());
  }
}
