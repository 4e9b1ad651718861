//! Domain models used by the backend: question kinds/sources, payloads, attempts, and error kinds.

use serde::{Deserialize, Serialize};

/// What kind of question is presented to the learner?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
  MultipleChoice,
  TrueFalse,
  ShortAnswer,
  FillInBlank,
  DragAndDrop,
  VoiceInput,
}
impl Default for QuestionKind {
  fn default() -> Self { QuestionKind::MultipleChoice }
}

/// Where did we get the question from?
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionSource {
  LessonBank,  // from user-provided TOML bank
  Seed,        // built-in seed lessons
  Fallback,    // substitute injected when a lesson resolves empty
}
impl Default for QuestionSource {
  fn default() -> Self { QuestionSource::Seed }
}

/// One selectable option of a multiple-choice question.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChoiceOption {
  pub id: String,
  pub label: String,
  pub correct: bool,
}

/// One branch of a true/false question.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoolOption {
  pub value: bool,
  pub label: String,
  pub correct: bool,
}

/// Kind-specific payload. Exactly one correct branch per question; option ids
/// are unique within a question.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionPayload {
  MultipleChoice {
    options: Vec<ChoiceOption>,
  },
  TrueFalse {
    options: Vec<BoolOption>,
  },
  ShortAnswer {
    answer: String,
    #[serde(default)]
    alternates: Vec<String>,
  },
  FillInBlank {
    template: String,
    answer: String,
    #[serde(default)]
    alternates: Vec<String>,
  },
  /// Sentence template with one blank slot. With `choices` present the
  /// learner drops a fragment in and the flagged one is correct; without
  /// them the assembled text is compared against `answer`.
  DragAndDrop {
    template: String,
    #[serde(default)]
    choices: Vec<ChoiceOption>,
    #[serde(default)]
    answer: Option<String>,
  },
  VoiceInput {
    /// Expected utterance, matched against the recognized text.
    target: String,
    /// What the client renders (usually the Arabic form).
    display: String,
    /// Per-question override of the direct similarity threshold.
    #[serde(default)]
    tolerance: Option<f64>,
    /// Preferred remote recognition model for this question.
    #[serde(default)]
    model_hint: Option<String>,
  },
}

impl QuestionPayload {
  pub fn kind(&self) -> QuestionKind {
    match self {
      QuestionPayload::MultipleChoice { .. } => QuestionKind::MultipleChoice,
      QuestionPayload::TrueFalse { .. } => QuestionKind::TrueFalse,
      QuestionPayload::ShortAnswer { .. } => QuestionKind::ShortAnswer,
      QuestionPayload::FillInBlank { .. } => QuestionKind::FillInBlank,
      QuestionPayload::DragAndDrop { .. } => QuestionKind::DragAndDrop,
      QuestionPayload::VoiceInput { .. } => QuestionKind::VoiceInput,
    }
  }
}

/// Core question structure held in the in-memory bank.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
  pub id: String,
  pub prompt: String,
  pub payload: QuestionPayload,
  pub source: QuestionSource,
}

/// One answered question, appended to the session and flushed to the
/// progress sink when one is configured.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
  pub question_id: String,
  pub question_type: QuestionKind,
  pub user_answer: String,
  pub correct_answer: String,
  pub is_correct: bool,
  /// RFC3339 UTC, e.g. "2026-08-25T10:15:30.123Z".
  pub timestamp_utc: String,
}

/// Final result of a completed quiz session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
  pub correct_count: u32,
  pub total_questions: u32,
  pub score_percent: f32,
  pub elapsed_seconds: u64,
}

/// Classified failures surfaced to the client. Gate and recognition code
/// convert lower-level errors into one of these; raw errors stay in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  AudioTooShort,
  AudioTooQuiet,
  NoSpeechDetected,
  MicrophonePermissionDenied,
  RecognitionTimeout,
  RecognitionNetworkError,
  RecognitionServerError,
  NoQuestionsAvailable,
}

impl ErrorKind {
  /// Human-readable message shown to the learner.
  pub fn user_message(&self) -> &'static str {
    match self {
      ErrorKind::AudioTooShort => "Recording too short. Try speaking a little longer.",
      ErrorKind::AudioTooQuiet => "Volume too low. Try speaking louder.",
      ErrorKind::NoSpeechDetected => "No clear speech detected. Make sure you pronounce the letter.",
      ErrorKind::MicrophonePermissionDenied => {
        "Microphone access was denied. Allow microphone use and try again."
      }
      ErrorKind::RecognitionTimeout => "Speech recognition timed out. Please try again.",
      ErrorKind::RecognitionNetworkError => {
        "Could not reach the speech recognition service. Check your connection."
      }
      ErrorKind::RecognitionServerError => {
        "The speech recognition service failed to process the audio."
      }
      ErrorKind::NoQuestionsAvailable => "No questions are available for this lesson.",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn payload_kind_matches_variant() {
    let p = QuestionPayload::VoiceInput {
      target: "ba".into(),
      display: "ب".into(),
      tolerance: None,
      model_hint: None,
    };
    assert_eq!(p.kind(), QuestionKind::VoiceInput);
  }

  #[test]
  fn error_kind_serializes_snake_case() {
    let s = serde_json::to_string(&ErrorKind::AudioTooShort).expect("json");
    assert_eq!(s, "\"audio_too_short\"");
    let s = serde_json::to_string(&ErrorKind::MicrophonePermissionDenied).expect("json");
    assert_eq!(s, "\"microphone_permission_denied\"");
  }

  #[test]
  fn payload_round_trips_with_type_tag() {
    let json = r#"{"type":"multiple_choice","options":[{"id":"a","label":"Ba","correct":true}]}"#;
    let p: QuestionPayload = serde_json::from_str(json).expect("parse");
    assert_eq!(p.kind(), QuestionKind::MultipleChoice);
  }
}
