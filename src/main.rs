//! Practice Engine · Technical Interview Practice Backend
//!
//! - Axum WebSocket API: one practice session per connection
//! - Remote question service client with a per-session cache
//! - Grading harness backed by a small script interpreter
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                  : u16 (default 3000)
//!   PRACTICE_CONFIG_PATH  : path to TOML config (service, practice, harness sections)
//!   QUESTION_SERVICE_URL  : overrides `[service] base_url`
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod script;
mod compare;
mod normalize;
mod service;
mod cache;
mod harness;
mod session;
mod state;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::load_config_from_env;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (config, question service client).
  let state = Arc::new(AppState::new(load_config_from_env())?);

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "practice_engine", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
