//! Loading quiz configuration (tuning knobs + optional question bank) from TOML.
//!
//! See `AppConfig` for the expected schema. Every section is optional; a
//! section that is present must be complete, otherwise the whole file is
//! rejected and the built-in defaults are used.

use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::audio::AudioQualityGate;
use crate::domain::{
  BoolOption, ChoiceOption, Question, QuestionKind, QuestionPayload, QuestionSource,
};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub quiz: QuizCfg,
  #[serde(default)]
  pub audio: AudioCfg,
  #[serde(default)]
  pub matching: MatchingCfg,
  #[serde(default)]
  pub recognition: RecognitionCfg,
  #[serde(default)]
  pub feedback: FeedbackTemplates,
  #[serde(default)]
  pub questions: Vec<QuestionCfg>,
}

/// Pacing and scoring knobs for a session.
#[derive(Clone, Debug, Deserialize)]
pub struct QuizCfg {
  pub feedback_delay_ms: u64,
  pub streak_milestones: Vec<u32>,
  pub use_fallback_question: bool,
}

impl Default for QuizCfg {
  fn default() -> Self {
    Self {
      feedback_delay_ms: 2000,
      streak_milestones: vec![3, 5, 10],
      use_fallback_question: true,
    }
  }
}

/// Thresholds for the capture-quality gate.
#[derive(Clone, Debug, Deserialize)]
pub struct AudioCfg {
  pub min_duration_secs: f32,
  pub min_volume_level: f32,
  pub silence_threshold: f32,
  pub min_speech_ratio: f32,
  pub min_peak: f32,
}

impl Default for AudioCfg {
  fn default() -> Self {
    let gate = AudioQualityGate::default();
    Self {
      min_duration_secs: gate.min_duration_secs,
      min_volume_level: gate.min_volume_level,
      silence_threshold: gate.silence_threshold,
      min_speech_ratio: gate.min_speech_ratio,
      min_peak: gate.min_peak,
    }
  }
}

impl AudioCfg {
  pub fn to_gate(&self) -> AudioQualityGate {
    AudioQualityGate {
      min_duration_secs: self.min_duration_secs,
      min_volume_level: self.min_volume_level,
      silence_threshold: self.silence_threshold,
      min_speech_ratio: self.min_speech_ratio,
      min_peak: self.min_peak,
    }
  }
}

/// Similarity thresholds for the answer matcher.
#[derive(Clone, Debug, Deserialize)]
pub struct MatchingCfg {
  pub direct_threshold: f64,
  pub transliteration_threshold: f64,
}

impl Default for MatchingCfg {
  fn default() -> Self {
    Self { direct_threshold: 0.8, transliteration_threshold: 0.7 }
  }
}

/// Local recognizer tuning plus the remote model chain. An empty `models`
/// list keeps the remote client's builtin chain.
#[derive(Clone, Debug, Deserialize)]
pub struct RecognitionCfg {
  pub languages: Vec<String>,
  pub attempt_timeout_secs: u64,
  pub min_confidence: f64,
  pub max_alternatives: usize,
  pub models: Vec<String>,
}

impl Default for RecognitionCfg {
  fn default() -> Self {
    Self {
      languages: vec!["ar-SA".into(), "en-US".into()],
      attempt_timeout_secs: 8,
      min_confidence: 0.55,
      max_alternatives: 3,
      models: Vec::new(),
    }
  }
}

/// Feedback sentences shown after each answer. Placeholders: {answer},
/// {heard}, {target}, {streak}.
#[derive(Clone, Debug, Deserialize)]
pub struct FeedbackTemplates {
  pub correct_text: String,
  pub incorrect_text: String,
  pub voice_match: String,
  pub voice_mismatch: String,
  pub streak_milestone: String,
}

impl Default for FeedbackTemplates {
  fn default() -> Self {
    Self {
      correct_text: "Correct! The answer is {answer}.".into(),
      incorrect_text: "Not quite. The correct answer is {answer}.".into(),
      voice_match: "Well done! We heard \"{heard}\", a match for {target}.".into(),
      voice_mismatch: "We heard \"{heard}\" but expected {target}.".into(),
      streak_milestone: "Great run! {streak} correct in a row.".into(),
    }
  }
}

/// Question entry accepted in TOML configuration.
/// Only the branch matching `kind` needs to be filled.
#[derive(Clone, Debug, Deserialize)]
pub struct QuestionCfg {
  #[serde(default)] pub id: Option<String>,
  pub lesson: String,
  pub kind: QuestionKind,
  pub prompt: String,
  // multiple_choice / true_false / drag_and_drop choices
  #[serde(default)] pub options: Vec<OptionCfg>,
  // short_answer / fill_in_blank / drag_and_drop
  #[serde(default)] pub answer: Option<String>,
  #[serde(default)] pub alternates: Vec<String>,
  #[serde(default)] pub template: Option<String>,
  // voice_input
  #[serde(default)] pub target: Option<String>,
  #[serde(default)] pub display: Option<String>,
  #[serde(default)] pub tolerance: Option<f64>,
  #[serde(default)] pub model_hint: Option<String>,
}

/// One option row. Choice rows carry an id, true/false rows carry a value.
#[derive(Clone, Debug, Deserialize)]
pub struct OptionCfg {
  #[serde(default)] pub id: Option<String>,
  pub label: String,
  #[serde(default)] pub correct: bool,
  #[serde(default)] pub value: Option<bool>,
}

impl QuestionCfg {
  /// Build a bank question, validating the branch the kind requires. Err
  /// carries the reason the entry was skipped.
  pub fn to_question(&self) -> Result<Question, String> {
    let payload = match self.kind {
      QuestionKind::MultipleChoice => {
        let options = self.choice_options()?;
        if options.len() < 2 {
          return Err("multiple_choice needs at least two options".into());
        }
        if options.iter().filter(|o| o.correct).count() != 1 {
          return Err("multiple_choice needs exactly one correct option".into());
        }
        QuestionPayload::MultipleChoice { options }
      }
      QuestionKind::TrueFalse => {
        let options: Vec<BoolOption> = self
          .options
          .iter()
          .map(|o| {
            Ok(BoolOption {
              value: o.value.ok_or_else(|| "option missing value".to_string())?,
              label: o.label.clone(),
              correct: o.correct,
            })
          })
          .collect::<Result<_, String>>()?;
        if options.len() != 2 {
          return Err("true_false needs exactly two options".into());
        }
        if options.iter().filter(|o| o.correct).count() != 1 {
          return Err("true_false needs exactly one correct option".into());
        }
        QuestionPayload::TrueFalse { options }
      }
      QuestionKind::ShortAnswer => QuestionPayload::ShortAnswer {
        answer: required(&self.answer, "answer")?,
        alternates: self.alternates.clone(),
      },
      QuestionKind::FillInBlank => QuestionPayload::FillInBlank {
        template: required(&self.template, "template")?,
        answer: required(&self.answer, "answer")?,
        alternates: self.alternates.clone(),
      },
      QuestionKind::DragAndDrop => {
        let template = required(&self.template, "template")?;
        if self.options.is_empty() {
          // No droppable choices: the client assembles free text.
          QuestionPayload::DragAndDrop {
            template,
            choices: Vec::new(),
            answer: Some(required(&self.answer, "answer")?),
          }
        } else {
          let choices = self.choice_options()?;
          if choices.len() < 2 {
            return Err("drag_and_drop needs at least two choices".into());
          }
          if choices.iter().filter(|o| o.correct).count() != 1 {
            return Err("drag_and_drop needs exactly one correct choice".into());
          }
          QuestionPayload::DragAndDrop { template, choices, answer: self.answer.clone() }
        }
      }
      QuestionKind::VoiceInput => {
        if let Some(t) = self.tolerance {
          if !(0.0..=1.0).contains(&t) {
            return Err(format!("tolerance {t} out of range 0..=1"));
          }
        }
        QuestionPayload::VoiceInput {
          target: required(&self.target, "target")?,
          display: required(&self.display, "display")?,
          tolerance: self.tolerance,
          model_hint: self.model_hint.clone(),
        }
      }
    };
    Ok(Question {
      id: self.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
      prompt: self.prompt.clone(),
      payload,
      source: QuestionSource::LessonBank,
    })
  }

  fn choice_options(&self) -> Result<Vec<ChoiceOption>, String> {
    self
      .options
      .iter()
      .map(|o| {
        Ok(ChoiceOption {
          id: o.id.clone().ok_or_else(|| "option missing id".to_string())?,
          label: o.label.clone(),
          correct: o.correct,
        })
      })
      .collect()
  }
}

fn required(v: &Option<String>, name: &str) -> Result<String, String> {
  match v {
    Some(s) if !s.trim().is_empty() => Ok(s.clone()),
    _ => Err(format!("missing {name}")),
  }
}

/// Attempt to load `AppConfig` from QUIZ_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_app_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("QUIZ_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "makhraj_backend", %path, "Loaded quiz config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "makhraj_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "makhraj_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_sections_fall_back_to_defaults() {
    let cfg: AppConfig = toml::from_str("").expect("empty config parses");
    assert_eq!(cfg.quiz.feedback_delay_ms, 2000);
    assert_eq!(cfg.quiz.streak_milestones, vec![3, 5, 10]);
    assert_eq!(cfg.matching.direct_threshold, 0.8);
    assert_eq!(cfg.recognition.languages, vec!["ar-SA".to_string(), "en-US".to_string()]);
    assert!(cfg.questions.is_empty());
  }

  #[test]
  fn a_partial_section_rejects_the_whole_file() {
    // feedback_delay_ms alone is not a complete [quiz] section.
    let err = toml::from_str::<AppConfig>("[quiz]\nfeedback_delay_ms = 1500\n");
    assert!(err.is_err());
  }

  #[test]
  fn a_complete_section_overrides_defaults() {
    let cfg: AppConfig = toml::from_str(
      r#"
[quiz]
feedback_delay_ms = 1500
streak_milestones = [2, 4]
use_fallback_question = false
"#,
    )
    .expect("complete section parses");
    assert_eq!(cfg.quiz.feedback_delay_ms, 1500);
    assert_eq!(cfg.quiz.streak_milestones, vec![2, 4]);
    assert!(!cfg.quiz.use_fallback_question);
  }

  #[test]
  fn question_entries_parse_with_sparse_fields() {
    let cfg: AppConfig = toml::from_str(
      r#"
[[questions]]
lesson = "letters-basic"
kind = "voice_input"
prompt = "Pronounce this letter aloud."
target = "ba"
display = "ب"
tolerance = 0.7

[[questions]]
lesson = "letters-basic"
kind = "multiple_choice"
prompt = "Which letter is this? ب"
options = [
  { id = "a", label = "Alif" },
  { id = "b", label = "Ba", correct = true },
]
"#,
    )
    .expect("question entries parse");
    assert_eq!(cfg.questions.len(), 2);
    assert_eq!(cfg.questions[0].target.as_deref(), Some("ba"));
    assert_eq!(cfg.questions[0].tolerance, Some(0.7));
    assert_eq!(cfg.questions[1].options.len(), 2);
    assert!(cfg.questions[1].options[1].correct);
  }

  #[test]
  fn voice_entry_builds_a_bank_question() {
    let cfg = QuestionCfg {
      id: Some("cfg-01".into()),
      lesson: "letters-basic".into(),
      kind: QuestionKind::VoiceInput,
      prompt: "Pronounce this letter aloud.".into(),
      options: Vec::new(),
      answer: None,
      alternates: Vec::new(),
      template: None,
      target: Some("ba".into()),
      display: Some("ب".into()),
      tolerance: Some(0.75),
      model_hint: None,
    };
    let q = cfg.to_question().expect("valid voice entry");
    assert_eq!(q.id, "cfg-01");
    assert_eq!(q.source, QuestionSource::LessonBank);
    match q.payload {
      QuestionPayload::VoiceInput { target, tolerance, .. } => {
        assert_eq!(target, "ba");
        assert_eq!(tolerance, Some(0.75));
      }
      other => panic!("unexpected payload: {other:?}"),
    }
  }

  #[test]
  fn incomplete_entries_are_rejected_with_a_reason() {
    let mut cfg = QuestionCfg {
      id: None,
      lesson: "letters-basic".into(),
      kind: QuestionKind::VoiceInput,
      prompt: "Pronounce this letter aloud.".into(),
      options: Vec::new(),
      answer: None,
      alternates: Vec::new(),
      template: None,
      target: None,
      display: Some("ب".into()),
      tolerance: None,
      model_hint: None,
    };
    assert!(cfg.to_question().expect_err("no target").contains("target"));

    cfg.target = Some("ba".into());
    cfg.tolerance = Some(1.5);
    assert!(cfg.to_question().expect_err("bad tolerance").contains("tolerance"));
  }

  #[test]
  fn choice_entries_need_exactly_one_correct_option() {
    let cfg = QuestionCfg {
      id: None,
      lesson: "letters-basic".into(),
      kind: QuestionKind::MultipleChoice,
      prompt: "Which letter is this? ب".into(),
      options: vec![
        OptionCfg { id: Some("a".into()), label: "Alif".into(), correct: true, value: None },
        OptionCfg { id: Some("b".into()), label: "Ba".into(), correct: true, value: None },
      ],
      answer: None,
      alternates: Vec::new(),
      template: None,
      target: None,
      display: None,
      tolerance: None,
      model_hint: None,
    };
    assert!(cfg.to_question().is_err());

    let entry_without_id = QuestionCfg {
      options: vec![
        OptionCfg { id: None, label: "Alif".into(), correct: true, value: None },
        OptionCfg { id: Some("b".into()), label: "Ba".into(), correct: false, value: None },
      ],
      ..cfg
    };
    assert!(entry_without_id.to_question().expect_err("no id").contains("id"));
  }

  #[test]
  fn drag_and_drop_entries_take_choices_or_a_free_text_answer() {
    let with_choices = QuestionCfg {
      id: None,
      lesson: "letters-basic".into(),
      kind: QuestionKind::DragAndDrop,
      prompt: "Drag the letter that completes bayt (house).".into(),
      options: vec![
        OptionCfg { id: Some("a".into()), label: "ي".into(), correct: true, value: None },
        OptionCfg { id: Some("b".into()), label: "و".into(), correct: false, value: None },
      ],
      answer: None,
      alternates: Vec::new(),
      template: Some("ب __ ت".into()),
      target: None,
      display: None,
      tolerance: None,
      model_hint: None,
    };
    match with_choices.to_question().expect("valid").payload {
      QuestionPayload::DragAndDrop { choices, answer, .. } => {
        assert_eq!(choices.len(), 2);
        assert!(answer.is_none());
      }
      other => panic!("unexpected payload: {other:?}"),
    }

    let free_text = QuestionCfg { options: Vec::new(), ..with_choices.clone() };
    assert!(free_text.to_question().expect_err("no answer").contains("answer"));

    let free_text = QuestionCfg { answer: Some("ب ي ت".into()), ..free_text };
    match free_text.to_question().expect("valid").payload {
      QuestionPayload::DragAndDrop { choices, answer, .. } => {
        assert!(choices.is_empty());
        assert_eq!(answer.as_deref(), Some("ب ي ت"));
      }
      other => panic!("unexpected payload: {other:?}"),
    }
  }

  #[test]
  fn entries_without_an_id_get_a_generated_one() {
    let cfg = QuestionCfg {
      id: None,
      lesson: "letters-basic".into(),
      kind: QuestionKind::ShortAnswer,
      prompt: "Type the name of the letter م.".into(),
      options: Vec::new(),
      answer: Some("mim".into()),
      alternates: vec!["meem".into()],
      template: None,
      target: None,
      display: None,
      tolerance: None,
      model_hint: None,
    };
    let a = cfg.to_question().expect("valid");
    let b = cfg.to_question().expect("valid");
    assert!(!a.id.is_empty());
    assert_ne!(a.id, b.id);
  }

  #[test]
  fn audio_section_builds_the_gate() {
    let cfg: AppConfig = toml::from_str(
      r#"
[audio]
min_duration_secs = 0.3
min_volume_level = 2.0
silence_threshold = 0.02
min_speech_ratio = 0.1
min_peak = 0.01
"#,
    )
    .expect("audio section parses");
    let gate = cfg.audio.to_gate();
    assert_eq!(gate.min_duration_secs, 0.3);
    assert_eq!(gate.min_volume_level, 2.0);
  }
}
