//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.
//!
//! Correctness never leaks here: `QuestionOut` strips the flags and canonical
//! answers a question carries internally. The learner only sees the expected
//! answer in feedback, after answering.

use serde::{Deserialize, Serialize};

use crate::domain::{ErrorKind, Question, QuestionKind, QuestionPayload, QuestionSource, SessionSummary};
use crate::engine::QuizPhase;
use crate::matcher::MatchMethod;
use crate::recognize::RecognitionSource;
use crate::seeds::LETTERS;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
  Ping,
  StartSession {
    #[serde(default)]
    lesson: Option<String>,
  },
  SubmitAnswer {
    #[serde(rename = "sessionId")]
    session_id: String,
    /// Choice questions (and drag-and-drop with choices) send the picked
    /// option id.
    #[serde(default, rename = "optionId")]
    option_id: Option<String>,
    /// True/false questions send the picked branch.
    #[serde(default)]
    value: Option<bool>,
    /// Text questions (and assembled drag-and-drop answers) send text.
    #[serde(default)]
    text: Option<String>,
  },
  SubmitVoice {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "audioBase64")]
    audio_base64: String,
    #[serde(default = "default_mime")]
    mime: String,
    #[serde(rename = "sampleRate", default = "default_sample_rate")]
    sample_rate: u32,
  },
  /// The client could not produce a recording at all (permission denial and
  /// friends). No audio reaches the server in that case.
  CaptureError {
    #[serde(rename = "sessionId")]
    session_id: String,
    error: String,
  },
  GetState {
    #[serde(rename = "sessionId")]
    session_id: String,
  },
  AbandonSession {
    #[serde(rename = "sessionId")]
    session_id: String,
  },
}

fn default_mime() -> String {
  "audio/wav".into()
}

fn default_sample_rate() -> u32 {
  16_000
}

impl ClientWsMessage {
  /// Variant name for logging. Voice payloads are too large to dump.
  pub fn name(&self) -> &'static str {
    match self {
      ClientWsMessage::Ping => "ping",
      ClientWsMessage::StartSession { .. } => "start_session",
      ClientWsMessage::SubmitAnswer { .. } => "submit_answer",
      ClientWsMessage::SubmitVoice { .. } => "submit_voice",
      ClientWsMessage::CaptureError { .. } => "capture_error",
      ClientWsMessage::GetState { .. } => "get_state",
      ClientWsMessage::AbandonSession { .. } => "abandon_session",
    }
  }
}

/// Messages the server sends back over WebSocket. Every client request gets
/// exactly one reply; `QuestionAdvanced` and `SessionCompleted` are pushed
/// unprompted when a feedback hold expires.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
  Pong,
  SessionStarted(SessionStartedOut),
  AnswerFeedback(FeedbackOut),
  VoiceRejected(VoiceRejectedOut),
  QuestionAdvanced(QuestionAdvancedOut),
  SessionCompleted(SessionCompletedOut),
  SessionState(SessionStateOut),
  /// Terminal start failure (no questions and fallback disabled).
  SessionFailed {
    kind: ErrorKind,
    message: String,
  },
  Error {
    message: String,
  },
}

/// Public rendering of one question. Only the fields the client needs to
/// render the prompt; no correct flags, no canonical answers, no tolerances.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOut {
  pub id: String,
  pub kind: QuestionKind,
  pub prompt: String,
  pub source: QuestionSource,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub options: Option<Vec<ChoiceOptionOut>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bool_options: Option<Vec<BoolOptionOut>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub template: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub display: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChoiceOptionOut {
  pub id: String,
  pub label: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct BoolOptionOut {
  pub value: bool,
  pub label: String,
}

/// Convert an internal `Question` to the public DTO.
pub fn to_out(q: &Question) -> QuestionOut {
  let mut out = QuestionOut {
    id: q.id.clone(),
    kind: q.payload.kind(),
    prompt: q.prompt.clone(),
    source: q.source,
    options: None,
    bool_options: None,
    template: None,
    display: None,
  };
  match &q.payload {
    QuestionPayload::MultipleChoice { options } => {
      out.options = Some(
        options
          .iter()
          .map(|o| ChoiceOptionOut { id: o.id.clone(), label: o.label.clone() })
          .collect(),
      );
    }
    QuestionPayload::TrueFalse { options } => {
      out.bool_options = Some(
        options
          .iter()
          .map(|o| BoolOptionOut { value: o.value, label: o.label.clone() })
          .collect(),
      );
    }
    QuestionPayload::ShortAnswer { .. } => {}
    QuestionPayload::FillInBlank { template, .. } => {
      out.template = Some(template.clone());
    }
    QuestionPayload::DragAndDrop { template, choices, .. } => {
      out.template = Some(template.clone());
      if !choices.is_empty() {
        out.options = Some(
          choices
            .iter()
            .map(|o| ChoiceOptionOut { id: o.id.clone(), label: o.label.clone() })
            .collect(),
        );
      }
    }
    QuestionPayload::VoiceInput { display, .. } => {
      out.display = Some(display.clone());
    }
  }
  out
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartedOut {
  pub session_id: String,
  pub lesson: String,
  pub total_questions: usize,
  pub index: usize,
  pub question: QuestionOut,
  /// Whether the server has a remote recognizer to fall back to.
  pub remote_recognition: bool,
}

/// One graded answer, as shown to the learner.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackOut {
  pub session_id: String,
  pub index: usize,
  pub correct: bool,
  pub user_answer: String,
  pub correct_answer: String,
  pub feedback: String,
  pub score: u32,
  pub streak: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub milestone: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub voice: Option<VoiceDetailOut>,
}

/// Extra detail attached to graded voice answers.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceDetailOut {
  pub heard: String,
  pub similarity: f64,
  pub method: MatchMethod,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub matched_spelling: Option<String>,
  pub source: RecognitionSource,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<ErrorKind>,
}

/// A recording that never reached recognition. Retryable: no attempt was
/// recorded and the learner may record again.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceRejectedOut {
  pub session_id: String,
  pub kind: ErrorKind,
  pub message: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAdvancedOut {
  pub session_id: String,
  pub index: usize,
  pub total_questions: usize,
  pub question: QuestionOut,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCompletedOut {
  pub session_id: String,
  pub summary: SessionSummary,
}

/// Point-in-time session snapshot for reconnecting or polling clients.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStateOut {
  pub session_id: String,
  pub lesson: String,
  pub phase: QuizPhase,
  pub index: usize,
  pub total_questions: usize,
  pub score: u32,
  pub streak: u32,
  pub best_streak: u32,
  pub elapsed_seconds: u64,
  pub answered: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub question: Option<QuestionOut>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub feedback_remaining_ms: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub summary: Option<SessionSummary>,
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct StartSessionIn {
  #[serde(default)]
  pub lesson: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
  #[serde(default, rename = "optionId")]
  pub option_id: Option<String>,
  #[serde(default)]
  pub value: Option<bool>,
  #[serde(default)]
  pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VoiceIn {
  #[serde(rename = "audioBase64")]
  pub audio_base64: String,
  #[serde(default = "default_mime")]
  pub mime: String,
  #[serde(rename = "sampleRate", default = "default_sample_rate")]
  pub sample_rate: u32,
}

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
}

#[derive(Serialize)]
pub struct ErrorOut {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub kind: Option<ErrorKind>,
}

/// One letter of the catalog, as served by `/api/v1/letters`.
#[derive(Serialize)]
pub struct LetterOut {
  pub arabic: &'static str,
  pub name: &'static str,
  pub variants: &'static [&'static str],
  pub syllables: u32,
}

pub fn letters_out() -> Vec<LetterOut> {
  LETTERS
    .iter()
    .map(|l| LetterOut { arabic: l.arabic, name: l.name, variants: l.variants, syllables: l.syllables })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::ChoiceOption;

  #[test]
  fn client_messages_parse_with_camel_case_fields() {
    let msg: ClientWsMessage = serde_json::from_str(
      r#"{"type":"submit_answer","sessionId":"s1","optionId":"b"}"#,
    )
    .expect("parse");
    match msg {
      ClientWsMessage::SubmitAnswer { session_id, option_id, value, text } => {
        assert_eq!(session_id, "s1");
        assert_eq!(option_id.as_deref(), Some("b"));
        assert!(value.is_none());
        assert!(text.is_none());
      }
      other => panic!("unexpected message: {other:?}"),
    }
  }

  #[test]
  fn submit_voice_defaults_mime_and_rate() {
    let msg: ClientWsMessage =
      serde_json::from_str(r#"{"type":"submit_voice","sessionId":"s1","audioBase64":"AAAA"}"#)
        .expect("parse");
    match msg {
      ClientWsMessage::SubmitVoice { mime, sample_rate, .. } => {
        assert_eq!(mime, "audio/wav");
        assert_eq!(sample_rate, 16_000);
      }
      other => panic!("unexpected message: {other:?}"),
    }
  }

  #[test]
  fn server_messages_carry_the_type_tag() {
    let v = serde_json::to_value(ServerWsMessage::SessionFailed {
      kind: ErrorKind::NoQuestionsAvailable,
      message: "No questions are available for this lesson.".into(),
    })
    .expect("json");
    assert_eq!(v["type"], "session_failed");
    assert_eq!(v["kind"], "no_questions_available");
  }

  #[test]
  fn question_out_never_exposes_correct_flags() {
    let q = Question {
      id: "q1".into(),
      prompt: "Which letter is this? ب".into(),
      payload: QuestionPayload::MultipleChoice {
        options: vec![
          ChoiceOption { id: "a".into(), label: "Alif".into(), correct: false },
          ChoiceOption { id: "b".into(), label: "Ba".into(), correct: true },
        ],
      },
      source: QuestionSource::Seed,
    };
    let v = serde_json::to_value(to_out(&q)).expect("json");
    assert_eq!(v["kind"], "multiple_choice");
    assert_eq!(v["options"][1]["id"], "b");
    assert!(v["options"][1].get("correct").is_none());
  }

  #[test]
  fn drag_and_drop_out_carries_template_and_unflagged_choices() {
    let q = Question {
      id: "q3".into(),
      prompt: "Drag the letter that completes bayt (house).".into(),
      payload: QuestionPayload::DragAndDrop {
        template: "ب __ ت".into(),
        choices: vec![
          ChoiceOption { id: "a".into(), label: "ي".into(), correct: true },
          ChoiceOption { id: "b".into(), label: "و".into(), correct: false },
        ],
        answer: None,
      },
      source: QuestionSource::Seed,
    };
    let v = serde_json::to_value(to_out(&q)).expect("json");
    assert_eq!(v["template"], "ب __ ت");
    assert_eq!(v["options"][0]["label"], "ي");
    assert!(v["options"][0].get("correct").is_none());
    assert!(v.get("answer").is_none());
  }

  #[test]
  fn voice_question_out_exposes_only_the_display_form() {
    let q = Question {
      id: "q2".into(),
      prompt: "Pronounce this letter aloud.".into(),
      payload: QuestionPayload::VoiceInput {
        target: "ba".into(),
        display: "ب".into(),
        tolerance: Some(0.7),
        model_hint: None,
      },
      source: QuestionSource::Seed,
    };
    let v = serde_json::to_value(to_out(&q)).expect("json");
    assert_eq!(v["display"], "ب");
    assert!(v.get("target").is_none());
    assert!(v.get("tolerance").is_none());
  }

  #[test]
  fn letters_endpoint_serves_the_whole_catalog() {
    let letters = letters_out();
    assert_eq!(letters.len(), 28);
    assert_eq!(letters[0].name, "alif");
  }
}
