//! Public protocol structs for the WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve engine and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Question, RunResult, Sample, Status};
use crate::session::Phase;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    SetQuery {
        text: String,
    },
    SelectQuestion {
        #[serde(rename = "questionId")]
        question_id: String,
    },
    SetBuffer {
        text: String,
    },
    RunTests,
    ResetBuffer,
    CopyBuffer,
    /// The client could not place the copied text on its clipboard.
    CopyFailed,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        session: SessionView,
    },
    Clipboard {
        text: String,
    },
    Error {
        message: String,
    },
}

/// Read-only projection of one practice session.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub phase: Phase,
    pub query: String,
    pub job_snippet: String,
    pub loading: bool,
    pub error: Option<String>,

    pub questions: Vec<QuestionSummary>,
    pub selected: Option<QuestionOut>,
    pub tests_available: bool,

    pub buffer: String,
    pub running: bool,
    pub copied: bool,

    pub results: Vec<RunResult>,
    pub passed: usize,
    pub total: usize,
    pub status: Option<Status>,
    pub console_hint: &'static str,
}

/// Entry in the question picker.
#[derive(Debug, Serialize)]
pub struct QuestionSummary {
    pub id: String,
    pub title: String,
    pub difficulty: String,
    pub difficulty_class: String,
}

/// The selected question as shown to the candidate. Hidden test cases stay server-side.
#[derive(Debug, Serialize)]
pub struct QuestionOut {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub difficulty_class: String,
    pub tags: Vec<String>,
    pub starter_code: String,
    pub samples: Vec<Sample>,
    pub language: Option<String>,
    pub prompt: Option<String>,
}

pub fn to_summary(q: &Question) -> QuestionSummary {
    QuestionSummary {
        id: q.id.clone(),
        title: q.title.clone(),
        difficulty: q.difficulty.clone(),
        difficulty_class: q.difficulty_class(),
    }
}

/// Convert the full `Question` (internal) to the public DTO.
pub fn to_out(q: &Question) -> QuestionOut {
    QuestionOut {
        id: q.id.clone(),
        title: q.title.clone(),
        description: q.description.clone(),
        difficulty: q.difficulty.clone(),
        difficulty_class: q.difficulty_class(),
        tags: q.tags.clone(),
        starter_code: q.starter_code.clone(),
        samples: q.samples.clone(),
        language: q.language.clone(),
        prompt: q.metadata.as_ref().and_then(|m| m.prompt.clone()),
    }
}

//
// HTTP response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_messages_parse() {
        let m: ClientWsMessage = serde_json::from_str(r#"{"type":"select_question","questionId":"q1"}"#).unwrap();
        assert!(matches!(m, ClientWsMessage::SelectQuestion { question_id } if question_id == "q1"));
        let m: ClientWsMessage = serde_json::from_str(r#"{"type":"run_tests"}"#).unwrap();
        assert!(matches!(m, ClientWsMessage::RunTests));
        assert!(serde_json::from_str::<ClientWsMessage>(r#"{"type":"launch_rockets"}"#).is_err());
    }

    #[test]
    fn server_messages_are_type_tagged() {
        let v = serde_json::to_value(ServerWsMessage::Clipboard { text: "x".into() }).unwrap();
        assert_eq!(v, json!({"type": "clipboard", "text": "x"}));
        assert_eq!(serde_json::to_value(ServerWsMessage::Pong).unwrap(), json!({"type": "pong"}));
    }
}
