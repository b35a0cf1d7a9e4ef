//! One candidate's practice session: query → questions → selection → buffer → run.
//!
//! `SessionController` is owned by a single task (the WebSocket loop) and is
//! only ever mutated from there. Slow work (question fetches, grading runs,
//! the copy-feedback timer) runs in spawned tasks that report back as
//! `SessionEvent`s on the channel returned by `SessionController::new`.
//! Each event carries the generation it was started under; events from a
//! superseded generation are dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{CancelHandle, QuestionFetcher, Questions};
use crate::config::{EngineConfig, PracticeConfig};
use crate::domain::{Question, RunResult, Status};
use crate::harness::{self, RunOutcome};
use crate::protocol::{to_out, to_summary, SessionView};
use crate::script::Limits;
use crate::service::FetchError;
use crate::util::job_snippet;

pub const NO_MATCHES: &str = "No matching technical questions were found for that job description.";
pub const COPY_FAILED: &str = "Unable to copy code. Please try again.";
pub const RUN_CRASHED: &str = "Unable to run tests. Please try again.";

pub const HINT_REVIEW: &str = "Review each test evaluation.";
pub const HINT_RUN: &str = "Run the tests to see feedback here.";
pub const HINT_SELF_CHECK: &str =
    "Automated tests are unavailable for this question. Use the examples to self-check your solution.";
pub const HINT_PASTE: &str = "Paste a job description to fetch tailored technical questions.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Error,
}

/// Completions of deferred work, fed back into `SessionController::handle_event`.
#[derive(Debug)]
pub enum SessionEvent {
    QuestionsLoaded {
        generation: u64,
        result: Result<Questions, FetchError>,
    },
    RunFinished {
        generation: u64,
        question_id: String,
        outcome: RunOutcome,
    },
    CopyExpired {
        generation: u64,
    },
}

pub struct SessionController {
    practice: PracticeConfig,
    limits: Limits,
    fetcher: QuestionFetcher,
    events: mpsc::UnboundedSender<SessionEvent>,

    query: String,
    phase: Phase,
    questions: Questions,
    selected: Option<String>,
    buffer: String,
    results: Vec<RunResult>,
    passed: usize,
    total: usize,
    status: Option<Status>,
    loading: bool,
    error: Option<String>,
    running: bool,
    copied: bool,

    fetch_generation: u64,
    run_generation: u64,
    copy_generation: u64,
    inflight: Option<CancelHandle>,
}

impl SessionController {
    pub fn new(
        cfg: &EngineConfig,
        fetcher: QuestionFetcher,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let ctl = Self {
            practice: cfg.practice.clone(),
            limits: cfg.harness,
            fetcher,
            events,
            query: String::new(),
            phase: Phase::Idle,
            questions: Arc::new(Vec::new()),
            selected: None,
            buffer: String::new(),
            results: Vec::new(),
            passed: 0,
            total: 0,
            status: None,
            loading: false,
            error: None,
            running: false,
            copied: false,
            fetch_generation: 0,
            run_generation: 0,
            copy_generation: 0,
            inflight: None,
        };
        (ctl, rx)
    }

    // --- Read-only projections ---

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn selected_question(&self) -> Option<&Question> {
        let id = self.selected.as_deref()?;
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn results(&self) -> (&[RunResult], usize, usize) {
        (&self.results, self.passed, self.total)
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn tests_available(&self) -> bool {
        self.selected_question().map(Question::tests_available).unwrap_or(false)
    }

    pub fn console_hint(&self) -> &'static str {
        if !self.results.is_empty() {
            HINT_REVIEW
        } else if self.tests_available() {
            HINT_RUN
        } else if self.selected_question().is_some() {
            HINT_SELF_CHECK
        } else {
            HINT_PASTE
        }
    }

    pub fn view(&self) -> SessionView {
        let (results, passed, total) = self.results();
        SessionView {
            phase: self.phase(),
            query: self.query.clone(),
            job_snippet: job_snippet(&self.query, self.practice.snippet_chars),
            loading: self.is_loading(),
            error: self.error().map(str::to_string),
            questions: self.questions().iter().map(to_summary).collect(),
            selected: self.selected_question().map(to_out),
            tests_available: self.tests_available(),
            buffer: self.buffer().to_string(),
            running: self.running,
            copied: self.copied,
            results: results.to_vec(),
            passed,
            total,
            status: self.status().cloned(),
            console_hint: self.console_hint(),
        }
    }

    // --- Entry points ---

    /// New job description. Cancels any in-flight fetch; a cached query goes
    /// straight to `Ready`, an empty one back to `Idle`.
    #[instrument(level = "info", skip(self, text), fields(query_len = text.len()))]
    pub async fn set_query(&mut self, text: &str) {
        let key = text.trim().to_string();
        if key == self.query.trim() {
            self.query = text.to_string();
            return;
        }
        self.query = text.to_string();
        self.fetch_generation += 1;
        if let Some(cancel) = self.inflight.take() {
            cancel.cancel();
        }

        if key.is_empty() {
            self.phase = Phase::Idle;
            self.loading = false;
            self.error = None;
            self.set_questions(Arc::new(Vec::new()));
            return;
        }

        if let Some(hit) = self.fetcher.cache().get(&key).await {
            debug!(target: "practice", count = hit.len(), "Questions served from cache");
            self.loading = false;
            self.error = None;
            self.phase = Phase::Ready;
            self.set_questions(hit);
            return;
        }

        info!(target: "practice", query_len = key.len(), generation = self.fetch_generation, "Fetching questions");
        self.phase = Phase::Loading;
        self.loading = true;
        self.error = None;

        let cancel = CancelHandle::new();
        self.inflight = Some(cancel.clone());
        let generation = self.fetch_generation;
        let fetcher = self.fetcher.clone();
        let tx = self.events.clone();
        let top_k = self.practice.top_k;
        tokio::spawn(async move {
            let result = fetcher.get_questions(&key, top_k, &cancel).await;
            let _ = tx.send(SessionEvent::QuestionsLoaded { generation, result });
        });
    }

    /// Switch to another question of the current list. Unknown ids are ignored.
    #[instrument(level = "info", skip(self))]
    pub fn select_question(&mut self, id: &str) {
        if self.selected.as_deref() == Some(id) {
            return;
        }
        if !self.questions.iter().any(|q| q.id == id) {
            warn!(target: "practice", %id, "select_question for unknown id ignored");
            return;
        }
        self.selected = Some(id.to_string());
        self.on_selection_changed();
    }

    pub fn set_buffer(&mut self, text: String) {
        self.buffer = text;
    }

    /// Grade the current buffer against the selected question. Precondition
    /// failures set the status immediately; otherwise a run is scheduled and its
    /// result arrives later as `RunFinished`.
    #[instrument(level = "info", skip(self), fields(buffer_len = self.buffer.len()))]
    pub fn run_tests(&mut self) {
        if self.running {
            debug!(target: "practice", "Run already pending; request ignored");
            return;
        }
        let Some(question) = self.selected_question().cloned() else {
            self.reject_run(harness::NO_QUESTION);
            return;
        };
        if self.phase != Phase::Ready {
            debug!(target: "practice", phase = ?self.phase, "Run ignored outside ready");
            return;
        }
        if let Err(message) = harness::precheck(&self.buffer, Some(&question)) {
            self.reject_run(message);
            return;
        }

        self.running = true;
        self.run_generation += 1;
        let generation = self.run_generation;
        let source = self.buffer.clone();
        let limits = self.limits;
        let delay = Duration::from_millis(self.practice.run_delay_ms);
        let tx = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let question_id = question.id.clone();
            let outcome = match tokio::task::spawn_blocking(move || harness::run(&source, Some(&question), limits)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(target: "practice", error = %e, "Grading task failed");
                    RunOutcome::rejected(RUN_CRASHED)
                }
            };
            let _ = tx.send(SessionEvent::RunFinished { generation, question_id, outcome });
        });
    }

    /// Put the starter source back and clear run feedback.
    pub fn reset_buffer(&mut self) {
        self.buffer = self.selected_question().map(|q| q.starter_code.clone()).unwrap_or_default();
        self.clear_feedback();
    }

    /// Returns the buffer for the client's clipboard and raises `copied` for a
    /// short while.
    pub fn copy_buffer(&mut self) -> String {
        self.copied = true;
        self.copy_generation += 1;
        let generation = self.copy_generation;
        let delay = Duration::from_millis(self.practice.copy_feedback_ms);
        let tx = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionEvent::CopyExpired { generation });
        });
        self.buffer.clone()
    }

    pub fn copy_failed(&mut self) {
        self.copied = false;
        self.status = Some(Status::error(COPY_FAILED));
    }

    /// Apply a completion. Stale completions are dropped without effect.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::QuestionsLoaded { generation, result } => {
                if generation != self.fetch_generation {
                    debug!(target: "practice", generation, current = self.fetch_generation, "Stale question fetch discarded");
                    return;
                }
                self.inflight = None;
                match result {
                    Err(FetchError::Cancelled) => {}
                    Ok(questions) if !questions.is_empty() => {
                        self.loading = false;
                        self.phase = Phase::Ready;
                        self.set_questions(questions);
                    }
                    Ok(_) => self.fail_fetch(NO_MATCHES.to_string()),
                    Err(e) => {
                        warn!(target: "practice", error = ?e, "Question fetch failed");
                        self.fail_fetch(e.user_message());
                    }
                }
            }
            SessionEvent::RunFinished { generation, question_id, outcome } => {
                if generation != self.run_generation || self.selected.as_deref() != Some(question_id.as_str()) {
                    debug!(target: "practice", generation, %question_id, "Stale run discarded");
                    return;
                }
                info!(target: "practice", %question_id, passed = outcome.passed, total = outcome.total, "Run applied");
                self.running = false;
                self.results = outcome.results;
                self.passed = outcome.passed;
                self.total = outcome.total;
                self.status = Some(outcome.status);
            }
            SessionEvent::CopyExpired { generation } => {
                if generation == self.copy_generation {
                    self.copied = false;
                }
            }
        }
    }

    // --- Internals ---

    fn set_questions(&mut self, questions: Questions) {
        self.selected = questions.first().map(|q| q.id.clone());
        self.questions = questions;
        self.on_selection_changed();
    }

    fn fail_fetch(&mut self, message: String) {
        self.loading = false;
        self.phase = Phase::Error;
        self.error = Some(message);
        self.set_questions(Arc::new(Vec::new()));
    }

    /// New selection (or none): fresh buffer, no feedback, pending run dropped.
    fn on_selection_changed(&mut self) {
        self.buffer = self.selected_question().map(|q| q.starter_code.clone()).unwrap_or_default();
        self.run_generation += 1;
        self.running = false;
        self.clear_feedback();
    }

    fn clear_feedback(&mut self) {
        self.results.clear();
        self.passed = 0;
        self.total = 0;
        self.status = None;
    }

    fn reject_run(&mut self, message: &str) {
        self.clear_feedback();
        self.status = Some(Status::error(message));
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(cancel) = self.inflight.take() {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StatusKind, TestCase};
    use crate::service::fake::{raw_question, FakeSource};
    use serde_json::json;

    fn test_config() -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.practice.run_delay_ms = 0;
        cfg.practice.copy_feedback_ms = 10;
        cfg
    }

    fn controller(source: FakeSource) -> (SessionController, mpsc::UnboundedReceiver<SessionEvent>, Arc<FakeSource>) {
        let source = Arc::new(source);
        let (ctl, rx) = SessionController::new(&test_config(), QuestionFetcher::new(source.clone()));
        (ctl, rx, source)
    }

    async fn pump(ctl: &mut SessionController, rx: &mut mpsc::UnboundedReceiver<SessionEvent>) {
        let event = rx.recv().await.expect("event channel open");
        ctl.handle_event(event);
    }

    fn two_questions() -> Vec<serde_json::Value> {
        let mut first = raw_question("Two Sum");
        first["starter_code"] = json!("function add(a, b) {\n}");
        vec![first, raw_question("Reverse")]
    }

    /// Remote questions never carry tests; give the loaded list some so runs can be exercised.
    fn make_gradable(ctl: &mut SessionController) {
        let mut qs: Vec<Question> = ctl.questions.as_ref().clone();
        for q in qs.iter_mut() {
            q.export_name = Some("add".into());
            q.tests = vec![
                TestCase { id: "t1".into(), args: vec![json!(2), json!(3)], expected: json!(5) },
                TestCase { id: "t2".into(), args: vec![json!(0), json!(0)], expected: json!(1) },
            ];
        }
        ctl.questions = Arc::new(qs);
    }

    #[tokio::test]
    async fn query_loads_and_selects_first() {
        let (mut ctl, mut rx, src) = controller(FakeSource::new().respond("rust", Ok(two_questions())));
        assert_eq!(ctl.phase(), Phase::Idle);
        assert_eq!(ctl.console_hint(), HINT_PASTE);

        ctl.set_query("  rust ").await;
        assert_eq!(ctl.phase(), Phase::Loading);
        assert!(ctl.is_loading());
        pump(&mut ctl, &mut rx).await;

        assert_eq!(ctl.phase(), Phase::Ready);
        assert!(!ctl.is_loading());
        assert_eq!(ctl.questions().len(), 2);
        assert_eq!(ctl.selected_question().map(|q| q.title.as_str()), Some("Two Sum"));
        assert_eq!(ctl.buffer(), "function add(a, b) {\n}");
        assert!(!ctl.tests_available());
        assert_eq!(ctl.console_hint(), HINT_SELF_CHECK);
        assert_eq!(src.request_count(), 1);
    }

    #[tokio::test]
    async fn cached_query_goes_straight_to_ready() {
        let (mut ctl, mut rx, src) = controller(FakeSource::new().respond("rust", Ok(two_questions())));
        ctl.set_query("rust").await;
        pump(&mut ctl, &mut rx).await;
        ctl.set_query("").await;
        assert_eq!(ctl.phase(), Phase::Idle);
        assert!(ctl.questions().is_empty());
        assert!(ctl.selected_question().is_none());

        ctl.set_query("rust").await;
        assert_eq!(ctl.phase(), Phase::Ready);
        assert_eq!(ctl.questions().len(), 2);
        assert_eq!(src.request_count(), 1);
    }

    #[tokio::test]
    async fn zero_questions_is_an_error_state() {
        let (mut ctl, mut rx, _src) = controller(FakeSource::new());
        ctl.set_query("cobol").await;
        pump(&mut ctl, &mut rx).await;
        assert_eq!(ctl.phase(), Phase::Error);
        assert_eq!(ctl.error(), Some(NO_MATCHES));
        assert!(ctl.questions().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_surfaces_server_message() {
        let err = FetchError::Server { status: 500, message: Some("Index not built".into()) };
        let (mut ctl, mut rx, _src) = controller(FakeSource::new().respond("rust", Err(err)));
        ctl.set_query("rust").await;
        pump(&mut ctl, &mut rx).await;
        assert_eq!(ctl.phase(), Phase::Error);
        assert_eq!(ctl.error(), Some("Index not built"));
        assert!(!ctl.is_loading());
    }

    #[tokio::test]
    async fn superseded_fetch_has_no_effect() {
        let source = FakeSource::gated()
            .respond("first", Ok(vec![raw_question("Old")]))
            .respond("second", Ok(vec![raw_question("New")]));
        let (mut ctl, mut rx, src) = controller(source);

        ctl.set_query("first").await;
        ctl.set_query("second").await;
        src.release(2);

        // Two completions arrive (the first cancelled, or at least stale); apply both.
        pump(&mut ctl, &mut rx).await;
        pump(&mut ctl, &mut rx).await;

        assert_eq!(ctl.phase(), Phase::Ready);
        assert_eq!(ctl.questions().len(), 1);
        assert_eq!(ctl.questions()[0].title, "New");
        assert!(ctl.fetcher.cache().get("first").await.is_none());
    }

    #[tokio::test]
    async fn empty_query_returns_to_idle() {
        let (mut ctl, mut rx, _src) = controller(FakeSource::new());
        ctl.set_query("cobol").await;
        pump(&mut ctl, &mut rx).await;
        ctl.set_query("   ").await;
        assert_eq!(ctl.phase(), Phase::Idle);
        assert!(ctl.error().is_none());
        assert!(!ctl.is_loading());
    }

    #[tokio::test]
    async fn run_without_selection_needs_a_question() {
        let (mut ctl, _rx, _src) = controller(FakeSource::new());
        ctl.set_buffer("function add(a, b) { return a + b; }".into());
        ctl.run_tests();
        assert_eq!(ctl.status(), Some(&Status::error(harness::NO_QUESTION)));
    }

    #[tokio::test]
    async fn remote_questions_report_tests_unavailable() {
        let (mut ctl, mut rx, _src) = controller(FakeSource::new().respond("rust", Ok(two_questions())));
        ctl.set_query("rust").await;
        pump(&mut ctl, &mut rx).await;
        ctl.set_buffer("function add(a, b) { return a + b; }".into());
        ctl.run_tests();
        assert_eq!(ctl.status(), Some(&Status::error(harness::TESTS_UNAVAILABLE)));
        assert!(!ctl.view().running);
    }

    #[tokio::test]
    async fn run_applies_results() {
        let (mut ctl, mut rx, _src) = controller(FakeSource::new().respond("rust", Ok(two_questions())));
        ctl.set_query("rust").await;
        pump(&mut ctl, &mut rx).await;
        make_gradable(&mut ctl);
        assert_eq!(ctl.console_hint(), HINT_RUN);

        ctl.set_buffer("function add(a, b) { return a + b; }".into());
        ctl.run_tests();
        assert!(ctl.view().running);
        ctl.run_tests(); // ignored while pending
        pump(&mut ctl, &mut rx).await;

        let (results, passed, total) = ctl.results();
        assert_eq!((results.len(), passed, total), (2, 1, 2));
        assert_eq!(ctl.status().map(|s| s.kind), Some(StatusKind::Error));
        assert_eq!(ctl.status().map(|s| s.message.as_str()), Some("Passed 1/2 tests"));
        assert_eq!(ctl.console_hint(), HINT_REVIEW);
        assert!(!ctl.view().running);
    }

    #[tokio::test]
    async fn run_is_ignored_while_loading() {
        let source = FakeSource::gated()
            .respond("rust", Ok(two_questions()))
            .respond("go", Ok(vec![raw_question("Goroutines")]));
        let (mut ctl, mut rx, src) = controller(source);
        ctl.set_query("rust").await;
        src.release(1);
        pump(&mut ctl, &mut rx).await;
        make_gradable(&mut ctl);

        ctl.set_query("go").await;
        assert_eq!(ctl.phase(), Phase::Loading);
        ctl.set_buffer("function add(a, b) { return a + b; }".into());
        ctl.run_tests();
        assert!(!ctl.view().running);
        assert!(ctl.status().is_none());

        src.release(1);
        pump(&mut ctl, &mut rx).await;
        assert_eq!(ctl.phase(), Phase::Ready);
        assert_eq!(ctl.questions()[0].title, "Goroutines");
    }

    #[tokio::test]
    async fn cache_hit_supersedes_pending_fetch() {
        let source = FakeSource::gated()
            .respond("b", Ok(vec![raw_question("B")]))
            .respond("a", Ok(vec![raw_question("A")]));
        let (mut ctl, mut rx, src) = controller(source);
        ctl.set_query("b").await;
        src.release(1);
        pump(&mut ctl, &mut rx).await;
        assert_eq!(ctl.questions()[0].title, "B");

        ctl.set_query("a").await;
        assert_eq!(ctl.phase(), Phase::Loading);
        ctl.set_query("b").await;
        assert_eq!(ctl.phase(), Phase::Ready);
        assert!(!ctl.is_loading());
        assert_eq!(ctl.questions()[0].title, "B");

        // The abandoned "a" fetch still reports back; it must not land.
        src.release(1);
        pump(&mut ctl, &mut rx).await;
        assert_eq!(ctl.phase(), Phase::Ready);
        assert_eq!(ctl.questions().len(), 1);
        assert_eq!(ctl.questions()[0].title, "B");
        assert!(ctl.fetcher.cache().get("a").await.is_none());
        assert!(src.request_count() <= 2);
    }

    #[tokio::test]
    async fn selecting_during_run_discards_it() {
        let (mut ctl, mut rx, _src) = controller(FakeSource::new().respond("rust", Ok(two_questions())));
        ctl.set_query("rust").await;
        pump(&mut ctl, &mut rx).await;
        make_gradable(&mut ctl);

        ctl.set_buffer("function add(a, b) { return a + b; }".into());
        ctl.run_tests();
        ctl.select_question("remote-question-1");
        assert_eq!(ctl.buffer(), "");
        pump(&mut ctl, &mut rx).await;

        assert!(ctl.results().0.is_empty());
        assert!(ctl.status().is_none());
        assert_eq!(ctl.selected_question().map(|q| q.id.as_str()), Some("remote-question-1"));
    }

    #[tokio::test]
    async fn reset_restores_starter_code() {
        let (mut ctl, mut rx, _src) = controller(FakeSource::new().respond("rust", Ok(two_questions())));
        ctl.set_query("rust").await;
        pump(&mut ctl, &mut rx).await;
        ctl.set_buffer("scribbles".into());
        ctl.run_tests();
        assert!(ctl.status().is_some());
        ctl.reset_buffer();
        assert_eq!(ctl.buffer(), "function add(a, b) {\n}");
        assert!(ctl.status().is_none());
    }

    #[tokio::test]
    async fn unknown_selection_is_ignored() {
        let (mut ctl, mut rx, _src) = controller(FakeSource::new().respond("rust", Ok(two_questions())));
        ctl.set_query("rust").await;
        pump(&mut ctl, &mut rx).await;
        ctl.set_buffer("edited".into());
        ctl.select_question("nope");
        assert_eq!(ctl.buffer(), "edited");
        assert_eq!(ctl.selected_question().map(|q| q.id.as_str()), Some("remote-question-0"));
    }

    #[tokio::test]
    async fn copy_flag_clears_after_feedback_window() {
        let (mut ctl, mut rx, _src) = controller(FakeSource::new());
        ctl.set_buffer("let x = 1;".into());
        assert_eq!(ctl.copy_buffer(), "let x = 1;");
        assert!(ctl.view().copied);
        pump(&mut ctl, &mut rx).await;
        assert!(!ctl.view().copied);

        ctl.copy_failed();
        assert_eq!(ctl.status(), Some(&Status::error(COPY_FAILED)));
    }

    #[tokio::test]
    async fn view_carries_snippet() {
        let (mut ctl, _rx, _src) = controller(FakeSource::gated());
        ctl.set_query("Senior   Rust\nengineer").await;
        let view = ctl.view();
        assert_eq!(view.job_snippet, "Senior Rust engineer");
        assert_eq!(view.phase, Phase::Loading);
    }
}
