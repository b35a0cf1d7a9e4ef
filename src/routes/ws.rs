//! WebSocket upgrade + session loop. Each connection owns one practice session.
//! Client messages are parsed as JSON and applied to the session; completions
//! of deferred work (fetches, runs, timers) arrive on the session's event
//! channel. After every change the client receives a fresh `session` snapshot.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};
use uuid::Uuid;

use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::session::SessionController;
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "practice_engine", "WebSocket upgrade requested");
  let session_id = Uuid::new_v4().to_string();
  ws.on_upgrade(move |socket| handle_ws(socket, state, session_id))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, session_id: String) {
  info!(target: "practice_engine", "WebSocket connected");
  let (mut session, mut events) = state.new_session();

  if send(&mut socket, &snapshot(&session)).await.is_err() {
    return;
  }

  'conn: loop {
    tokio::select! {
      msg = socket.recv() => {
        let Some(Ok(msg)) = msg else { break };
        match msg {
          Message::Text(txt) => {
            // Parse, apply, serialize replies.
            let replies = match serde_json::from_str::<ClientWsMessage>(&txt) {
              Ok(incoming) => {
                debug!(target: "practice_engine", "WS received: {:?}", message_kind(&incoming));
                handle_client_ws(incoming, &mut session).await
              }
              Err(e) => vec![ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }],
            };
            for reply in &replies {
              if send(&mut socket, reply).await.is_err() {
                break 'conn;
              }
            }
          }
          Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
          Message::Close(_) => break,
          _ => {}
        }
      }
      Some(event) = events.recv() => {
        session.handle_event(event);
        if send(&mut socket, &snapshot(&session)).await.is_err() {
          break;
        }
      }
    }
  }
  info!(target: "practice_engine", "WebSocket disconnected");
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> Result<(), axum::Error> {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  socket.send(Message::Text(out)).await.map_err(|e| {
    error!(target: "practice_engine", error = %e, "WS send error");
    e
  })
}

fn snapshot(session: &SessionController) -> ServerWsMessage {
  ServerWsMessage::Session { session: session.view() }
}

/// Message name for logs; bodies (job descriptions, code) are not logged.
fn message_kind(msg: &ClientWsMessage) -> &'static str {
  match msg {
    ClientWsMessage::Ping => "ping",
    ClientWsMessage::SetQuery { .. } => "set_query",
    ClientWsMessage::SelectQuestion { .. } => "select_question",
    ClientWsMessage::SetBuffer { .. } => "set_buffer",
    ClientWsMessage::RunTests => "run_tests",
    ClientWsMessage::ResetBuffer => "reset_buffer",
    ClientWsMessage::CopyBuffer => "copy_buffer",
    ClientWsMessage::CopyFailed => "copy_failed",
  }
}

async fn handle_client_ws(msg: ClientWsMessage, session: &mut SessionController) -> Vec<ServerWsMessage> {
  match msg {
    ClientWsMessage::Ping => return vec![ServerWsMessage::Pong],
    ClientWsMessage::SetQuery { text } => session.set_query(&text).await,
    ClientWsMessage::SelectQuestion { question_id } => session.select_question(&question_id),
    ClientWsMessage::SetBuffer { text } => session.set_buffer(text),
    ClientWsMessage::RunTests => session.run_tests(),
    ClientWsMessage::ResetBuffer => session.reset_buffer(),
    ClientWsMessage::CopyBuffer => {
      let text = session.copy_buffer();
      return vec![ServerWsMessage::Clipboard { text }, snapshot(session)];
    }
    ClientWsMessage::CopyFailed => session.copy_failed(),
  }
  vec![snapshot(session)]
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::EngineConfig;
  use crate::service::fake::FakeSource;

  fn session() -> SessionController {
    let state = AppState::with_source(EngineConfig::default(), Arc::new(FakeSource::new()));
    state.new_session().0
  }

  #[tokio::test]
  async fn ping_gets_pong() {
    let mut s = session();
    let replies = handle_client_ws(ClientWsMessage::Ping, &mut s).await;
    assert!(matches!(replies.as_slice(), [ServerWsMessage::Pong]));
  }

  #[tokio::test]
  async fn copy_sends_clipboard_then_snapshot() {
    let mut s = session();
    handle_client_ws(ClientWsMessage::SetBuffer { text: "let x = 1;".into() }, &mut s).await;
    let replies = handle_client_ws(ClientWsMessage::CopyBuffer, &mut s).await;
    match replies.as_slice() {
      [ServerWsMessage::Clipboard { text }, ServerWsMessage::Session { session }] => {
        assert_eq!(text, "let x = 1;");
        assert!(session.copied);
      }
      other => panic!("unexpected replies: {:?}", other),
    }
  }

  #[tokio::test]
  async fn run_without_question_reports_status() {
    let mut s = session();
    let replies = handle_client_ws(ClientWsMessage::RunTests, &mut s).await;
    let [ServerWsMessage::Session { session }] = replies.as_slice() else { panic!("expected one snapshot") };
    assert_eq!(session.status.as_ref().map(|st| st.message.as_str()), Some(crate::harness::NO_QUESTION));
  }
}
