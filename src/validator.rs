//! Pure answer checking for every question kind.
//!
//! Validation never performs I/O. Choices are checked by option id, text by
//! normalized equality against the expected answer and its alternates, and
//! voice through a strict gate over the recognition result before the fuzzy
//! match verdict is trusted.

use tracing::instrument;

use crate::domain::{ChoiceOption, Question, QuestionPayload};
use crate::matcher::MatchResult;
use crate::recognize::RecognitionResult;
use crate::util::{is_arabic_letter, normalize_answer};

/// Transcriptions the recognition stack substitutes when it has nothing real
/// to say. Any of these means no valid speech, never a correct answer.
const PLACEHOLDER_TRANSCRIPTIONS: [&str; 5] = [
  "audio_detected",
  "no transcription available",
  "target unavailable",
  "fallback evaluation",
  "system error - using basic evaluation",
];

/// One submitted answer, already decoded from the wire and (for voice) run
/// through the recognition pipeline.
#[derive(Clone, Debug)]
pub enum SubmittedAnswer {
  Choice { option_id: String },
  Boolean { value: bool },
  Text { value: String },
  Voice { recognition: RecognitionResult, match_result: MatchResult },
}

/// The graded outcome, with display strings ready for feedback and records.
#[derive(Clone, Debug)]
pub struct Verdict {
  pub is_correct: bool,
  pub user_answer: String,
  pub correct_answer: String,
}

/// Grade one answer against its question. Err means the submission does not
/// fit the question (wrong kind, unknown option id), not a wrong answer.
#[instrument(level = "debug", skip(question, answer), fields(question_id = %question.id, kind = ?question.payload.kind()))]
pub fn validate(question: &Question, answer: &SubmittedAnswer) -> Result<Verdict, String> {
  match (&question.payload, answer) {
    (QuestionPayload::MultipleChoice { options }, SubmittedAnswer::Choice { option_id }) => {
      choice_verdict(options, option_id)
    }

    (QuestionPayload::TrueFalse { options }, SubmittedAnswer::Boolean { value }) => {
      let picked = options
        .iter()
        .find(|o| o.value == *value)
        .ok_or_else(|| format!("no option for value {value}"))?;
      let correct = options
        .iter()
        .find(|o| o.correct)
        .ok_or_else(|| "question has no correct option".to_string())?;
      Ok(Verdict {
        is_correct: picked.correct,
        user_answer: picked.label.clone(),
        correct_answer: correct.label.clone(),
      })
    }

    (QuestionPayload::ShortAnswer { answer: expected, alternates }, SubmittedAnswer::Text { value }) => {
      Ok(text_verdict(value, expected, alternates))
    }

    (QuestionPayload::FillInBlank { answer: expected, alternates, .. }, SubmittedAnswer::Text { value }) => {
      Ok(text_verdict(value, expected, alternates))
    }

    (QuestionPayload::DragAndDrop { choices, answer, .. }, submitted) => {
      if choices.is_empty() {
        let SubmittedAnswer::Text { value } = submitted else {
          return Err("this drag_and_drop takes an assembled text answer".into());
        };
        let expected = answer
          .as_deref()
          .ok_or_else(|| "question has no canonical answer".to_string())?;
        Ok(text_verdict(value, expected, &[]))
      } else {
        let SubmittedAnswer::Choice { option_id } = submitted else {
          return Err("this drag_and_drop takes a dropped option id".into());
        };
        choice_verdict(choices, option_id)
      }
    }

    (
      QuestionPayload::VoiceInput { target, display, .. },
      SubmittedAnswer::Voice { recognition, match_result },
    ) => {
      let heard = recognition.text.trim();
      let user_answer = if heard.is_empty() {
        "(no speech recognized)".to_string()
      } else {
        heard.to_string()
      };
      let is_correct = has_valid_speech(recognition) && match_result.is_match;
      Ok(Verdict {
        is_correct,
        user_answer,
        correct_answer: format!("{} ({})", display, target),
      })
    }

    _ => Err(format!("answer does not fit a {:?} question", question.payload.kind())),
  }
}

/// Strict gate over a recognition result. Failed recognitions, placeholder
/// transcriptions, and noise-length text are never counted as an answer.
pub fn has_valid_speech(recognition: &RecognitionResult) -> bool {
  if !recognition.success || recognition.error.is_some() {
    return false;
  }
  let text = recognition.text.trim();
  let count = text.chars().count();
  if count == 0 {
    return false;
  }
  if count == 1 {
    // A lone Arabic letter is a real utterance in letter drills; anything
    // else that short is noise.
    if !text.chars().all(is_arabic_letter) {
      return false;
    }
  }
  let lowered = text.to_lowercase();
  !PLACEHOLDER_TRANSCRIPTIONS.iter().any(|p| lowered == *p)
}

fn choice_verdict(options: &[ChoiceOption], option_id: &str) -> Result<Verdict, String> {
  let picked = options
    .iter()
    .find(|o| o.id == option_id)
    .ok_or_else(|| format!("unknown option id {option_id}"))?;
  let correct = options
    .iter()
    .find(|o| o.correct)
    .ok_or_else(|| "question has no correct option".to_string())?;
  Ok(Verdict {
    is_correct: picked.correct,
    user_answer: picked.label.clone(),
    correct_answer: correct.label.clone(),
  })
}

fn text_verdict(value: &str, expected: &str, alternates: &[String]) -> Verdict {
  let normalized = normalize_answer(value);
  let is_correct = normalized == normalize_answer(expected)
    || alternates.iter().any(|a| normalized == normalize_answer(a));
  Verdict {
    is_correct,
    user_answer: value.trim().to_string(),
    correct_answer: expected.to_string(),
  }
}
