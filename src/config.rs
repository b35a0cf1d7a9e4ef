//! Loading engine configuration (question service, session timings, harness budgets) from TOML.
//!
//! See `EngineConfig` for the expected schema. Every field has a default, so an
//! empty file (or no file at all) is a valid configuration.

use serde::Deserialize;
use tracing::{info, error};

use crate::script::Limits;

#[derive(Clone, Debug, Deserialize, Default, PartialEq)]
pub struct EngineConfig {
  #[serde(default)]
  pub service: ServiceConfig,
  #[serde(default)]
  pub practice: PracticeConfig,
  #[serde(default)]
  pub harness: Limits,
}

/// Where the remote question service lives.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
  pub base_url: String,
  pub timeout_secs: u64,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self { base_url: "http://localhost:8000".into(), timeout_secs: 20 }
  }
}

/// Per-session knobs.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PracticeConfig {
  /// Questions requested per job description.
  pub top_k: usize,
  /// Pause before a run starts so the "running" state is visible.
  pub run_delay_ms: u64,
  /// How long the `copied` flag stays up after `copy_buffer`.
  pub copy_feedback_ms: u64,
  pub snippet_chars: usize,
}

impl Default for PracticeConfig {
  fn default() -> Self {
    Self { top_k: 3, run_delay_ms: 200, copy_feedback_ms: 1200, snippet_chars: 140 }
  }
}

/// Load `EngineConfig` from PRACTICE_CONFIG_PATH, then apply QUESTION_SERVICE_URL.
/// Any IO/parse error is logged and defaults are used instead.
pub fn load_config_from_env() -> EngineConfig {
  let mut cfg = match std::env::var("PRACTICE_CONFIG_PATH") {
    Ok(path) => load_config_file(&path).unwrap_or_default(),
    Err(_) => EngineConfig::default(),
  };
  if let Ok(url) = std::env::var("QUESTION_SERVICE_URL") {
    if !url.trim().is_empty() {
      cfg.service.base_url = url.trim().to_string();
    }
  }
  cfg
}

fn load_config_file(path: &str) -> Option<EngineConfig> {
  match std::fs::read_to_string(path) {
    Ok(s) => match toml::from_str::<EngineConfig>(&s) {
      Ok(cfg) => {
        info!(target: "practice_engine", %path, "Loaded engine config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "practice_engine", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "practice_engine", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_document_is_all_defaults() {
    let cfg: EngineConfig = toml::from_str("").unwrap();
    assert_eq!(cfg, EngineConfig::default());
    assert_eq!(cfg.practice.top_k, 3);
    assert_eq!(cfg.service.base_url, "http://localhost:8000");
  }

  #[test]
  fn partial_sections_keep_other_defaults() {
    let cfg: EngineConfig = toml::from_str(
      "[service]\nbase_url = \"http://questions:9000\"\n\n[practice]\ntop_k = 5\n\n[harness]\nmax_call_depth = 64\n",
    )
    .unwrap();
    assert_eq!(cfg.service.base_url, "http://questions:9000");
    assert_eq!(cfg.service.timeout_secs, 20);
    assert_eq!(cfg.practice.top_k, 5);
    assert_eq!(cfg.practice.run_delay_ms, 200);
    assert_eq!(cfg.harness.max_call_depth, 64);
    assert_eq!(cfg.harness.max_steps, 1_000_000);
  }

  #[test]
  fn unreadable_file_yields_none() {
    assert!(load_config_file("/nonexistent/practice.toml").is_none());
  }
}
