//! Application state shared by every connection: engine config and the
//! question source.
//!
//! Sessions are not stored here. Each WebSocket connection builds its own
//! `SessionController` (with its own question cache) via `new_session`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, instrument};

use crate::cache::QuestionFetcher;
use crate::config::EngineConfig;
use crate::service::{QuestionService, QuestionSource};
use crate::session::{SessionController, SessionEvent};

#[derive(Clone)]
pub struct AppState {
    pub config: EngineConfig,
    pub source: Arc<dyn QuestionSource>,
}

impl AppState {
    /// Build state from config: construct the HTTP client for the question service.
    #[instrument(level = "info", skip_all, fields(base_url = %config.service.base_url))]
    pub fn new(config: EngineConfig) -> Result<Self, reqwest::Error> {
        let service = QuestionService::new(&config.service)?;
        info!(target: "practice_engine", top_k = config.practice.top_k, "Question service client ready");
        Ok(Self::with_source(config, Arc::new(service)))
    }

    pub fn with_source(config: EngineConfig, source: Arc<dyn QuestionSource>) -> Self {
        Self { config, source }
    }

    pub fn new_session(&self) -> (SessionController, mpsc::UnboundedReceiver<SessionEvent>) {
        SessionController::new(&self.config, QuestionFetcher::new(self.source.clone()))
    }
}
