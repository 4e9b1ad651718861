//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Starting sessions (question set assembly + clock task spawn)
//!   - Grading typed/choice answers and voice recordings
//!   - Capture-failure classification (client never produced audio)
//!   - Session snapshots and abandonment
//!
//! Everything here takes `&Arc<AppState>` and returns protocol DTOs, so the
//! two transports stay thin.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::audio::AudioSample;
use crate::config::FeedbackTemplates;
use crate::domain::{ErrorKind, QuestionPayload, SessionSummary};
use crate::engine::{QuizPhase, QuizSession};
use crate::protocol::{
  to_out, FeedbackOut, SessionStartedOut, SessionStateOut, VoiceDetailOut, VoiceRejectedOut,
};
use crate::recognize::RecognitionResult;
use crate::seeds::DEFAULT_LESSON;
use crate::state::{spawn_session_clock, AppState, SessionEvent, SessionHandle};
use crate::util::{fill_template, trunc_for_log};
use crate::validator::{validate, SubmittedAnswer, Verdict};

/// Why a session-scoped request failed. HTTP maps these to 404/400; the WS
/// loop folds them into error replies.
#[derive(Debug)]
pub enum RequestError {
  UnknownSession(String),
  BadRequest(String),
}

impl std::fmt::Display for RequestError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RequestError::UnknownSession(id) => write!(f, "unknown session {id}"),
      RequestError::BadRequest(msg) => write!(f, "{msg}"),
    }
  }
}

/// Outcome of a voice submission: either a graded answer, or a retryable
/// rejection that recorded nothing.
#[derive(Debug)]
pub enum VoiceReply {
  Feedback(FeedbackOut),
  Rejected(VoiceRejectedOut),
}

/// Start a quiz session over the given lesson (default lesson when omitted)
/// and spawn its clock. `events` is the push channel of the owning WebSocket;
/// HTTP-started sessions pass None and poll instead.
#[instrument(level = "info", skip(state, events))]
pub async fn start_session(
  state: &Arc<AppState>,
  lesson: Option<String>,
  events: Option<mpsc::UnboundedSender<SessionEvent>>,
) -> Result<SessionStartedOut, ErrorKind> {
  let lesson = lesson
    .filter(|l| !l.trim().is_empty())
    .unwrap_or_else(|| DEFAULT_LESSON.to_string());

  let questions = state.build_question_set(&lesson);
  if questions.is_empty() {
    error!(target: "quiz", %lesson, "Session start refused: no questions");
    return Err(ErrorKind::NoQuestionsAvailable);
  }

  let id = Uuid::new_v4().to_string();
  let mut session = QuizSession::new(id.clone(), lesson.clone(), questions)
    .map_err(|_| ErrorKind::NoQuestionsAvailable)?;
  // A fresh session is in Loading; this transition cannot be refused.
  let _ = session.start(Instant::now());

  let Some(first) = session.current_question().cloned() else {
    return Err(ErrorKind::NoQuestionsAvailable);
  };
  let out = SessionStartedOut {
    session_id: id.clone(),
    lesson: lesson.clone(),
    total_questions: session.total_questions(),
    index: 0,
    question: to_out(&first),
    remote_recognition: state.recognizer.remote_enabled(),
  };

  state.insert_session(SessionHandle { session, events }).await;
  spawn_session_clock(state.clone(), id.clone());
  info!(target: "quiz", session_id = %id, %lesson, total = out.total_questions, "Session started");
  Ok(out)
}

/// Decode the three optional answer fields into one submission. Exactly one
/// of them must be present.
pub fn parse_submission(
  option_id: Option<String>,
  value: Option<bool>,
  text: Option<String>,
) -> Result<SubmittedAnswer, String> {
  match (option_id, value, text) {
    (Some(option_id), None, None) => Ok(SubmittedAnswer::Choice { option_id }),
    (None, Some(value), None) => Ok(SubmittedAnswer::Boolean { value }),
    (None, None, Some(value)) => Ok(SubmittedAnswer::Text { value }),
    (None, None, None) => Err("missing answer: send optionId, value, or text".into()),
    _ => Err("ambiguous answer: send exactly one of optionId, value, text".into()),
  }
}

/// Grade a typed or choice answer against the current question.
#[instrument(level = "info", skip(state, answer), fields(%session_id))]
pub async fn submit_answer(
  state: &Arc<AppState>,
  session_id: &str,
  answer: SubmittedAnswer,
) -> Result<FeedbackOut, RequestError> {
  let mut sessions = state.sessions.write().await;
  let handle = sessions
    .get_mut(session_id)
    .ok_or_else(|| RequestError::UnknownSession(session_id.to_string()))?;

  let question = handle
    .session
    .current_question()
    .cloned()
    .ok_or_else(|| RequestError::BadRequest("session is not presenting a question".into()))?;
  if matches!(question.payload, QuestionPayload::VoiceInput { .. }) {
    return Err(RequestError::BadRequest(
      "voice questions take submit_voice with an audio payload".into(),
    ));
  }

  let verdict = validate(&question, &answer).map_err(RequestError::BadRequest)?;
  let outcome = handle
    .session
    .record_answer(&verdict, Instant::now(), state.feedback_delay, &state.milestones)
    .map_err(RequestError::BadRequest)?;

  let index = handle.session.current_index();
  let feedback = answer_feedback_text(&state.templates, &verdict);
  let milestone = milestone_text(&state.templates, outcome.milestone);
  flush_attempt(state, handle, session_id);
  info!(target: "quiz", %session_id, correct = verdict.is_correct, score = outcome.score, "Answer evaluated");

  Ok(FeedbackOut {
    session_id: session_id.to_string(),
    index,
    correct: verdict.is_correct,
    user_answer: verdict.user_answer,
    correct_answer: verdict.correct_answer,
    feedback,
    score: outcome.score,
    streak: outcome.streak,
    milestone,
    voice: None,
  })
}

/// Run a recording through the full voice pipeline: decode, gate, recognize,
/// match, grade. Gate rejections return `Rejected` and record nothing.
#[instrument(level = "info", skip(state, audio_base64), fields(%session_id, %mime, sample_rate))]
pub async fn submit_voice(
  state: &Arc<AppState>,
  session_id: &str,
  audio_base64: &str,
  mime: &str,
  sample_rate: u32,
) -> Result<VoiceReply, RequestError> {
  // Snapshot the voice target so the lock is not held across recognition.
  let (index, target, display, tolerance, model_hint) = {
    let sessions = state.sessions.read().await;
    let handle = sessions
      .get(session_id)
      .ok_or_else(|| RequestError::UnknownSession(session_id.to_string()))?;
    if handle.session.phase() != QuizPhase::InProgress {
      return Err(RequestError::BadRequest("session is not accepting answers".into()));
    }
    let question = handle
      .session
      .current_question()
      .ok_or_else(|| RequestError::BadRequest("session is not presenting a question".into()))?;
    match &question.payload {
      QuestionPayload::VoiceInput { target, display, tolerance, model_hint } => (
        handle.session.current_index(),
        target.clone(),
        display.clone(),
        *tolerance,
        model_hint.clone(),
      ),
      _ => {
        return Err(RequestError::BadRequest(
          "current question does not take a voice answer".into(),
        ))
      }
    }
  };

  let sample =
    AudioSample::from_pcm16_base64(audio_base64, mime, sample_rate).map_err(RequestError::BadRequest)?;
  debug!(target: "quiz", duration_secs = sample.duration_secs(), volume = sample.volume_level(), "Voice payload decoded");

  if let Err(rejection) = state.gate.assess(&sample) {
    info!(target: "quiz", %session_id, kind = ?rejection.kind, "Recording rejected before recognition");
    return Ok(VoiceReply::Rejected(VoiceRejectedOut {
      session_id: session_id.to_string(),
      kind: rejection.kind,
      message: rejection.message,
    }));
  }

  let recognition = state.recognizer.recognize(&sample, &target, model_hint.as_deref()).await;
  let match_result = state.matcher.match_answer(&recognition.text, &target, tolerance);

  // Grade under the write lock, guarding against a session that moved on
  // (advanced or abandoned) while recognition ran.
  let mut sessions = state.sessions.write().await;
  let handle = sessions
    .get_mut(session_id)
    .ok_or_else(|| RequestError::UnknownSession(session_id.to_string()))?;
  if handle.session.phase() != QuizPhase::InProgress || handle.session.current_index() != index {
    return Err(RequestError::BadRequest(
      "session moved on while the recording was processed".into(),
    ));
  }
  let question = handle
    .session
    .current_question()
    .cloned()
    .ok_or_else(|| RequestError::BadRequest("session is not presenting a question".into()))?;

  let submitted = SubmittedAnswer::Voice {
    recognition: recognition.clone(),
    match_result: match_result.clone(),
  };
  let verdict = validate(&question, &submitted).map_err(RequestError::BadRequest)?;
  let outcome = handle
    .session
    .record_answer(&verdict, Instant::now(), state.feedback_delay, &state.milestones)
    .map_err(RequestError::BadRequest)?;

  let feedback = voice_feedback_text(&state.templates, &recognition, &verdict, &display, &target);
  let milestone = milestone_text(&state.templates, outcome.milestone);
  flush_attempt(state, handle, session_id);
  info!(
    target: "quiz",
    %session_id,
    correct = verdict.is_correct,
    heard = %trunc_for_log(&recognition.text, 80),
    similarity = match_result.similarity,
    source = ?recognition.source,
    "Voice answer evaluated"
  );

  Ok(VoiceReply::Feedback(FeedbackOut {
    session_id: session_id.to_string(),
    index,
    correct: verdict.is_correct,
    user_answer: verdict.user_answer,
    correct_answer: verdict.correct_answer,
    feedback,
    score: outcome.score,
    streak: outcome.streak,
    milestone,
    voice: Some(VoiceDetailOut {
      heard: recognition.text.clone(),
      similarity: match_result.similarity,
      method: match_result.method,
      matched_spelling: match_result.matched_spelling.clone(),
      source: recognition.source,
      error: recognition.error,
    }),
  }))
}

/// The client failed to capture audio at all. Classify the reported error and
/// hand back a retryable rejection; nothing is recorded.
#[instrument(level = "info", skip(state, error), fields(%session_id))]
pub async fn capture_failure(
  state: &Arc<AppState>,
  session_id: &str,
  error: &str,
) -> Result<VoiceRejectedOut, RequestError> {
  let sessions = state.sessions.read().await;
  if !sessions.contains_key(session_id) {
    return Err(RequestError::UnknownSession(session_id.to_string()));
  }
  let kind = classify_capture_error(error);
  warn!(target: "quiz", %session_id, kind = ?kind, error = %trunc_for_log(error, 200), "Client capture failed");
  Ok(VoiceRejectedOut {
    session_id: session_id.to_string(),
    kind,
    message: kind.user_message().to_string(),
  })
}

/// Map a client-side capture error string to a classified kind.
fn classify_capture_error(error: &str) -> ErrorKind {
  let lowered = error.to_lowercase();
  if lowered.contains("permission") || lowered.contains("notallowed") || lowered.contains("denied")
  {
    ErrorKind::MicrophonePermissionDenied
  } else {
    ErrorKind::NoSpeechDetected
  }
}

/// Point-in-time snapshot for reconnecting or polling clients.
#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn session_state(
  state: &Arc<AppState>,
  session_id: &str,
) -> Result<SessionStateOut, RequestError> {
  let sessions = state.sessions.read().await;
  let handle = sessions
    .get(session_id)
    .ok_or_else(|| RequestError::UnknownSession(session_id.to_string()))?;
  let s = &handle.session;
  Ok(SessionStateOut {
    session_id: s.id.clone(),
    lesson: s.lesson.clone(),
    phase: s.phase(),
    index: s.current_index(),
    total_questions: s.total_questions(),
    score: s.score(),
    streak: s.streak(),
    best_streak: s.best_streak(),
    elapsed_seconds: s.elapsed_seconds(),
    answered: s.answers().len(),
    question: s.current_question().map(to_out),
    feedback_remaining_ms: s.feedback_remaining_ms(Instant::now()),
    summary: s.summary().cloned(),
  })
}

/// End a session early. The summary counts unanswered questions against the
/// score; per-question attempts were already flushed, so no summary is posted.
#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn abandon_session(
  state: &Arc<AppState>,
  session_id: &str,
) -> Result<SessionSummary, RequestError> {
  let mut handle = state
    .remove_session(session_id)
    .await
    .ok_or_else(|| RequestError::UnknownSession(session_id.to_string()))?;
  let summary = handle.session.abandon(Instant::now());
  info!(target: "quiz", %session_id, answered = handle.session.answers().len(), "Session abandoned");
  Ok(summary)
}

/// Abandon every session a disconnected socket had started.
#[instrument(level = "debug", skip(state, session_ids), fields(count = session_ids.len()))]
pub async fn teardown_sessions(state: &Arc<AppState>, session_ids: &[String]) {
  for id in session_ids {
    if let Some(mut handle) = state.remove_session(id).await {
      if handle.session.phase() != QuizPhase::Completed {
        handle.session.abandon(Instant::now());
        info!(target: "quiz", session_id = %id, "Session torn down with its socket");
      }
    }
  }
}

// -------- Feedback texts & flushing --------

fn answer_feedback_text(templates: &FeedbackTemplates, verdict: &Verdict) -> String {
  let tpl = if verdict.is_correct { &templates.correct_text } else { &templates.incorrect_text };
  fill_template(tpl, &[("answer", &verdict.correct_answer)])
}

fn voice_feedback_text(
  templates: &FeedbackTemplates,
  recognition: &RecognitionResult,
  verdict: &Verdict,
  display: &str,
  target: &str,
) -> String {
  if let Some(kind) = recognition.error {
    return kind.user_message().to_string();
  }
  let shown = format!("{} ({})", display, target);
  let heard = recognition.text.trim();
  let heard = if heard.is_empty() { "nothing" } else { heard };
  let tpl = if verdict.is_correct { &templates.voice_match } else { &templates.voice_mismatch };
  fill_template(tpl, &[("heard", heard), ("target", &shown)])
}

fn milestone_text(templates: &FeedbackTemplates, milestone: Option<u32>) -> Option<String> {
  milestone
    .map(|n| fill_template(&templates.streak_milestone, &[("streak", n.to_string().as_str())]))
}

/// Post the freshest attempt record in the background; failures only log.
fn flush_attempt(state: &Arc<AppState>, handle: &SessionHandle, session_id: &str) {
  let Some(progress) = state.progress.clone() else { return };
  let Some(record) = handle.session.answers().last().cloned() else { return };
  let lesson = handle.session.lesson.clone();
  let session_id = session_id.to_string();
  tokio::spawn(async move {
    if let Err(e) = progress.post_attempt(&session_id, &lesson, &record).await {
      error!(target: "quiz", %session_id, error = %e, "Attempt flush failed");
    }
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;
  use std::time::Duration;

  use base64::Engine;
  use tokio::sync::RwLock;

  use crate::audio::{synth_bursts, AudioQualityGate};
  use crate::config::AppConfig;
  use crate::domain::{ChoiceOption, Question, QuestionSource};
  use crate::matcher::SimilarityMatcher;
  use crate::recognize::RecognitionOrchestrator;
  use crate::seeds::transliteration_table;

  fn mc_question(id: &str) -> Question {
    Question {
      id: id.into(),
      prompt: "Which letter is this? ب".into(),
      payload: QuestionPayload::MultipleChoice {
        options: vec![
          ChoiceOption { id: "a".into(), label: "Alif".into(), correct: false },
          ChoiceOption { id: "b".into(), label: "Ba".into(), correct: true },
        ],
      },
      source: QuestionSource::Seed,
    }
  }

  fn voice_question(id: &str) -> Question {
    Question {
      id: id.into(),
      prompt: "Pronounce this letter aloud.".into(),
      payload: QuestionPayload::VoiceInput {
        target: "ba".into(),
        display: "ب".into(),
        tolerance: None,
        model_hint: None,
      },
      source: QuestionSource::Seed,
    }
  }

  /// State with a single "drill" lesson, no remote clients, and no local
  /// recognizer, so recognition outcomes are deterministic.
  fn test_state(questions: Vec<Question>, feedback_delay_ms: u64) -> Arc<AppState> {
    let cfg = AppConfig::default();
    let mut bank = HashMap::new();
    bank.insert("drill".to_string(), questions);
    Arc::new(AppState {
      sessions: Arc::new(RwLock::new(HashMap::new())),
      bank,
      matcher: SimilarityMatcher::new(0.8, 0.7, transliteration_table()),
      gate: AudioQualityGate::default(),
      recognizer: RecognitionOrchestrator::new(None, None),
      progress: None,
      feedback_delay: Duration::from_millis(feedback_delay_ms),
      milestones: cfg.quiz.streak_milestones,
      use_fallback_question: true,
      templates: cfg.feedback,
    })
  }

  fn encode_sample(sample: &crate::audio::AudioSample) -> String {
    base64::engine::general_purpose::STANDARD.encode(sample.raw_bytes())
  }

  #[tokio::test]
  async fn a_choice_answer_is_graded_and_scored() {
    let state = test_state(vec![mc_question("q0"), mc_question("q1")], 60_000);
    let started =
      start_session(&state, Some("drill".into()), None).await.expect("lesson exists");
    assert_eq!(started.total_questions, 2);
    assert_eq!(started.index, 0);

    let out = submit_answer(
      &state,
      &started.session_id,
      SubmittedAnswer::Choice { option_id: "b".into() },
    )
    .await
    .expect("fits the question");
    assert!(out.correct);
    assert_eq!(out.score, 1);
    assert_eq!(out.streak, 1);
    assert!(out.feedback.contains("Ba"));
    assert!(out.voice.is_none());
  }

  #[tokio::test]
  async fn a_second_submit_during_feedback_is_rejected() {
    let state = test_state(vec![mc_question("q0"), mc_question("q1")], 60_000);
    let started = start_session(&state, Some("drill".into()), None).await.expect("start");

    submit_answer(&state, &started.session_id, SubmittedAnswer::Choice { option_id: "b".into() })
      .await
      .expect("first lands");
    let second =
      submit_answer(&state, &started.session_id, SubmittedAnswer::Choice { option_id: "b".into() })
        .await;
    assert!(matches!(second, Err(RequestError::BadRequest(_))));

    let snapshot = session_state(&state, &started.session_id).await.expect("live");
    assert_eq!(snapshot.answered, 1);
    assert_eq!(snapshot.score, 1);
  }

  #[tokio::test]
  async fn unknown_sessions_are_reported_as_such() {
    let state = test_state(vec![mc_question("q0")], 60_000);
    let err = submit_answer(&state, "nope", SubmittedAnswer::Choice { option_id: "b".into() })
      .await
      .expect_err("no such session");
    assert!(matches!(err, RequestError::UnknownSession(_)));
    assert!(matches!(
      session_state(&state, "nope").await,
      Err(RequestError::UnknownSession(_))
    ));
  }

  #[tokio::test]
  async fn voice_questions_refuse_typed_answers() {
    let state = test_state(vec![voice_question("v0")], 60_000);
    let started = start_session(&state, Some("drill".into()), None).await.expect("start");
    let err =
      submit_answer(&state, &started.session_id, SubmittedAnswer::Text { value: "ba".into() })
        .await
        .expect_err("wrong channel");
    match err {
      RequestError::BadRequest(msg) => assert!(msg.contains("submit_voice")),
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[tokio::test]
  async fn a_short_recording_is_rejected_without_recording_an_attempt() {
    let state = test_state(vec![voice_question("v0")], 60_000);
    let started = start_session(&state, Some("drill".into()), None).await.expect("start");

    // 0.05 s of audio, well under the gate's duration floor.
    let sample = crate::audio::AudioSample::from_samples(vec![0.5; 800], 16_000);
    let reply =
      submit_voice(&state, &started.session_id, &encode_sample(&sample), "audio/wav", 16_000)
        .await
        .expect("request is well-formed");
    match reply {
      VoiceReply::Rejected(out) => assert_eq!(out.kind, ErrorKind::AudioTooShort),
      other => panic!("expected rejection, got {other:?}"),
    }

    let snapshot = session_state(&state, &started.session_id).await.expect("live");
    assert_eq!(snapshot.answered, 0);
    assert_eq!(snapshot.phase, QuizPhase::InProgress);
  }

  #[tokio::test]
  async fn a_recognition_failure_counts_the_attempt_as_incorrect() {
    // No recognizers configured: a clip that clears the gate still cannot be
    // transcribed, which grades as incorrect with an explanation.
    let state = test_state(vec![voice_question("v0")], 60_000);
    let started = start_session(&state, Some("drill".into()), None).await.expect("start");

    let sample = synth_bursts(1, 0.3, 0.2, 0.8);
    let reply =
      submit_voice(&state, &started.session_id, &encode_sample(&sample), "audio/wav", 16_000)
        .await
        .expect("request is well-formed");
    match reply {
      VoiceReply::Feedback(out) => {
        assert!(!out.correct);
        let voice = out.voice.expect("voice detail present");
        assert_eq!(voice.error, Some(ErrorKind::RecognitionServerError));
        assert_eq!(out.feedback, ErrorKind::RecognitionServerError.user_message());
      }
      other => panic!("expected feedback, got {other:?}"),
    }

    let snapshot = session_state(&state, &started.session_id).await.expect("live");
    assert_eq!(snapshot.answered, 1);
    assert_eq!(snapshot.score, 0);
  }

  #[tokio::test]
  async fn the_clock_advances_past_feedback_and_completes() {
    let state = test_state(vec![mc_question("q0"), mc_question("q1")], 0);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let started =
      start_session(&state, Some("drill".into()), Some(tx)).await.expect("start");

    submit_answer(&state, &started.session_id, SubmittedAnswer::Choice { option_id: "a".into() })
      .await
      .expect("first answer");
    let event = tokio::time::timeout(Duration::from_secs(3), rx.recv())
      .await
      .expect("clock ticks")
      .expect("channel open");
    match event {
      SessionEvent::Advanced { index, total, question, .. } => {
        assert_eq!(index, 1);
        assert_eq!(total, 2);
        assert_eq!(question.id, "q1");
      }
      other => panic!("expected advance, got {other:?}"),
    }

    submit_answer(&state, &started.session_id, SubmittedAnswer::Choice { option_id: "b".into() })
      .await
      .expect("second answer");
    let event = tokio::time::timeout(Duration::from_secs(3), rx.recv())
      .await
      .expect("clock ticks")
      .expect("channel open");
    match event {
      SessionEvent::Completed { summary, .. } => {
        assert_eq!(summary.total_questions, 2);
        assert_eq!(summary.correct_count, 1);
        assert_eq!(summary.score_percent, 50.0);
      }
      other => panic!("expected completion, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn abandoning_freezes_and_removes_the_session() {
    let state = test_state(vec![mc_question("q0"), mc_question("q1")], 60_000);
    let started = start_session(&state, Some("drill".into()), None).await.expect("start");

    submit_answer(&state, &started.session_id, SubmittedAnswer::Choice { option_id: "b".into() })
      .await
      .expect("one answer");
    let summary = abandon_session(&state, &started.session_id).await.expect("live");
    assert_eq!(summary.correct_count, 1);
    assert_eq!(summary.total_questions, 2);

    assert!(matches!(
      abandon_session(&state, &started.session_id).await,
      Err(RequestError::UnknownSession(_))
    ));
  }

  #[tokio::test]
  async fn an_empty_lesson_substitutes_the_fallback_question() {
    let state = test_state(Vec::new(), 60_000);
    let started =
      start_session(&state, Some("unheard-of".into()), None).await.expect("fallback kicks in");
    assert_eq!(started.total_questions, 1);
    assert_eq!(started.question.source, QuestionSource::Fallback);
  }

  #[tokio::test]
  async fn a_disabled_fallback_makes_start_fail() {
    let state = test_state(Vec::new(), 60_000);
    // Rebuild with the substitution switched off.
    let state = Arc::new(AppState {
      sessions: Arc::new(RwLock::new(HashMap::new())),
      bank: HashMap::new(),
      matcher: SimilarityMatcher::new(0.8, 0.7, transliteration_table()),
      gate: state.gate,
      recognizer: RecognitionOrchestrator::new(None, None),
      progress: None,
      feedback_delay: state.feedback_delay,
      milestones: state.milestones.clone(),
      use_fallback_question: false,
      templates: state.templates.clone(),
    });
    let err = start_session(&state, Some("unheard-of".into()), None)
      .await
      .expect_err("nothing to serve");
    assert_eq!(err, ErrorKind::NoQuestionsAvailable);
  }

  #[test]
  fn submissions_must_carry_exactly_one_answer_field() {
    assert!(matches!(
      parse_submission(Some("b".into()), None, None),
      Ok(SubmittedAnswer::Choice { .. })
    ));
    assert!(matches!(
      parse_submission(None, Some(true), None),
      Ok(SubmittedAnswer::Boolean { value: true })
    ));
    assert!(matches!(
      parse_submission(None, None, Some("mim".into())),
      Ok(SubmittedAnswer::Text { .. })
    ));
    assert!(parse_submission(None, None, None).is_err());
    assert!(parse_submission(Some("b".into()), Some(true), None).is_err());
  }

  #[test]
  fn capture_errors_classify_by_keyword() {
    assert_eq!(
      classify_capture_error("NotAllowedError: Permission denied"),
      ErrorKind::MicrophonePermissionDenied
    );
    assert_eq!(classify_capture_error("no-speech"), ErrorKind::NoSpeechDetected);
    assert_eq!(classify_capture_error("audio-capture aborted"), ErrorKind::NoSpeechDetected);
  }
}
