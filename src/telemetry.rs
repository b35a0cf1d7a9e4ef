//! Logging setup for the practice server.
//!
//! `LOG_LEVEL` takes an `EnvFilter` directive string; when unset, session and
//! engine targets log at debug and HTTP plumbing at info. `LOG_FORMAT=json`
//! switches to one JSON object per line for log shipping.
//!
//! Session events (fetches, runs, selection) log under `practice`; server
//! startup, the question cache and grading log under `practice_engine`.
//! Job descriptions and submitted source are never logged, only their lengths.

use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
        EnvFilter::new("info,practice=debug,practice_engine=debug,tower_http=info,axum=info")
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // `json()` changes the builder type, so each arm calls `init` itself.
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => {
            builder.json().init();
        }
        _ => {
            builder.init();
        }
    }
}
